//! Boundaries to the outside world: static page fetching and remote browser
//! automation. Everything the pipeline does over the network goes through
//! one of these traits.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// Raw response of a static page fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// HTTP status code of the response
    pub status: u16,
    /// Response body decoded as text
    pub body: String,
}

impl FetchedPage {
    /// Only a 200 counts as a usable page
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Performs a single HTTP GET with browser-mimicking headers.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page with a single GET
    ///
    /// # Arguments
    /// * `url` - Absolute URL of the page
    ///
    /// # Returns
    /// * `Result<FetchedPage>` - The status and body. Transport failures are
    ///   errors, while any HTTP status is a page
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// Anything that can turn a URL into usable page HTML, handling non-200
/// statuses and bot challenges on the way.
#[async_trait]
pub trait PageSource: Send {
    /// Load the HTML of a page
    ///
    /// # Arguments
    /// * `url` - Absolute URL of the page
    ///
    /// # Returns
    /// * `Result<String>` - The page HTML, or `FetchFailed` or `Captcha` when
    ///   no usable page could be obtained
    async fn load(&mut self, url: &str) -> Result<String>;
}

/// How to find an element in a rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    Name(String),
    Css(String),
}

impl Locator {
    pub fn id(id: &str) -> Self {
        Self::Id(id.to_owned())
    }

    pub fn name(name: &str) -> Self {
        Self::Name(name.to_owned())
    }

    pub fn css(selector: &str) -> Self {
        Self::Css(selector.to_owned())
    }

    /// CSS form of the locator, usable by any backend.
    pub fn to_css(&self) -> String {
        match self {
            Self::Id(id) => format!("#{id}"),
            Self::Name(name) => format!("[name=\"{name}\"]"),
            Self::Css(css) => css.clone(),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={id}"),
            Self::Name(name) => write!(f, "name={name}"),
            Self::Css(css) => write!(f, "css={css}"),
        }
    }
}

/// Opaque reference to an element found in the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub usize);

/// One live remote-browser session. Lookups and interactions fail fast;
/// callers decide whether to poll.
#[async_trait]
pub trait BrowserSession: Send {
    /// Load a page in the session's window
    ///
    /// # Arguments
    /// * `url` - Absolute URL to open
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Find the first element matching a locator
    ///
    /// # Arguments
    /// * `locator` - How to find the element
    ///
    /// # Returns
    /// * `Result<ElementHandle>` - Handle to the element, or an error when
    ///   nothing matches right now
    async fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle>;

    /// Find every element matching a locator
    ///
    /// # Returns
    /// * `Result<Vec<ElementHandle>>` - Handles in document order. Zero
    ///   matches is an empty list, not an error
    async fn find_elements(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>>;

    /// Find the first descendant of `parent` matching a locator
    ///
    /// # Arguments
    /// * `parent` - Element to search under
    /// * `locator` - How to find the child
    async fn find_child(&mut self, parent: ElementHandle, locator: &Locator) -> Result<ElementHandle>;

    async fn click(&mut self, element: ElementHandle) -> Result<()>;

    /// Type text into an element
    ///
    /// # Arguments
    /// * `element` - Input to type into
    /// * `text` - Keys to send, as-is
    async fn send_keys(&mut self, element: ElementHandle, text: &str) -> Result<()>;

    /// Switch the browsing context into the named frame.
    async fn focus_frame(&mut self, name: &str) -> Result<()>;

    /// # Returns
    /// * `Result<String>` - The current DOM serialized as HTML
    async fn rendered_html(&mut self) -> Result<String>;

    /// Ends the session and releases whatever backs it.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens browser sessions, optionally on a persisted profile directory.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Start a session and navigate it to a first page
    ///
    /// # Arguments
    /// * `url` - Page to open once the session is up
    /// * `profile_dir` - Browser profile to reuse, for a signed-in session
    ///
    /// # Returns
    /// * `Result<Box<dyn BrowserSession>>` - The live session. The caller
    ///   must `close` it
    async fn open(&self, url: &str, profile_dir: Option<&Path>) -> Result<Box<dyn BrowserSession>>;
}
