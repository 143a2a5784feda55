//! Remote browser automation over WebDriver.

mod webdriver;

pub use webdriver::{WebDriverLauncher, WebDriverSession};
