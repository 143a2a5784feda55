//! Runtime configuration read from the environment (and `.env`).

use std::env::VarError;
use std::time::Duration;

use thiserror::Error;

use crate::retry::Backoff;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/86.0.4240.75 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Delays applied between browser interactions. These pace the automation so
/// it does not look scripted; they are not network waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// After every click, typed field and page load (`SNIPER_STEP_DELAY_MILLIS`)
    pub step: Duration,
    /// Before switching into the buy-now checkout frame
    /// (`SNIPER_CHECKOUT_WIDGET_DELAY_MILLIS`)
    pub checkout_widget: Duration,
    /// Before reading the DOM of a page rendered for a bot challenge
    /// (`SNIPER_RENDER_DELAY_MILLIS`)
    pub render: Duration,
}

impl Pacing {
    pub const fn none() -> Self {
        Self {
            step: Duration::ZERO,
            checkout_widget: Duration::ZERO,
            render: Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(1),
            checkout_widget: Duration::from_secs(5),
            render: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Whole-request timeout of static fetches
    pub http_timeout: Duration,
    /// Wait before every static fetch.
    pub throttle: Duration,
    pub pacing: Pacing,
    /// How long element lookups poll before giving up
    pub element_wait: Backoff,
    /// Lifetime of cached products (`SNIPER_CACHE_TTL_SECS`)
    pub cache_ttl: Duration,
    /// Path or name of the chromedriver binary
    pub chromedriver: String,
    pub webdriver_port: u16,
    pub headless: bool,
    /// User agent of static fetches
    pub user_agent: String,
    /// Raw `Cookie` header for static fetches, if any
    pub cookie: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(30),
            throttle: Duration::from_secs(1),
            pacing: Pacing::default(),
            element_wait: Backoff::new(Duration::from_secs(10), Duration::from_millis(10)),
            cache_ttl: Duration::from_secs(600),
            chromedriver: "chromedriver".to_owned(),
            webdriver_port: 9515,
            headless: false,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            cookie: None,
        }
    }
}

impl Config {
    /// Loads `.env` (if present) and reads `SNIPER_*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvVar`] when a variable is set but
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key))
    }

    /// Builds a config from an arbitrary variable lookup; unset variables
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let defaults = Self::default();

        let parse_u64 = |var: &str, default: u64| -> Result<u64, ConfigError> {
            lookup(var).map_or(Ok(default), |raw| {
                raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
                    var: var.to_owned(),
                    reason: e.to_string(),
                })
            })
        };
        let millis = |var: &str, default: Duration| -> Result<Duration, ConfigError> {
            parse_u64(var, default.as_millis() as u64).map(Duration::from_millis)
        };
        let secs = |var: &str, default: Duration| -> Result<Duration, ConfigError> {
            parse_u64(var, default.as_secs()).map(Duration::from_secs)
        };

        let webdriver_port = match lookup("SNIPER_WEBDRIVER_PORT") {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidEnvVar {
                var: "SNIPER_WEBDRIVER_PORT".to_owned(),
                reason: e.to_string(),
            })?,
            Err(_) => defaults.webdriver_port,
        };

        let headless = match lookup("SNIPER_HEADLESS").as_deref().map(str::trim) {
            Ok("1" | "true" | "yes") => true,
            Ok("0" | "false" | "no" | "") | Err(_) => false,
            Ok(other) => {
                return Err(ConfigError::InvalidEnvVar {
                    var: "SNIPER_HEADLESS".to_owned(),
                    reason: format!("expected a boolean, got {other:?}"),
                });
            }
        };

        let element_timeout = millis("SNIPER_ELEMENT_TIMEOUT_MILLIS", defaults.element_wait.deadline)?;
        let poll_interval = millis("SNIPER_POLL_INTERVAL_MILLIS", defaults.element_wait.initial)?;

        Ok(Self {
            http_timeout: secs("SNIPER_HTTP_TIMEOUT_SECS", defaults.http_timeout)?,
            throttle: millis("SNIPER_THROTTLE_MILLIS", defaults.throttle)?,
            pacing: Pacing {
                step: millis("SNIPER_STEP_DELAY_MILLIS", defaults.pacing.step)?,
                checkout_widget: millis(
                    "SNIPER_CHECKOUT_WIDGET_DELAY_MILLIS",
                    defaults.pacing.checkout_widget,
                )?,
                render: millis("SNIPER_RENDER_DELAY_MILLIS", defaults.pacing.render)?,
            },
            element_wait: Backoff::new(element_timeout, poll_interval),
            cache_ttl: secs("SNIPER_CACHE_TTL_SECS", defaults.cache_ttl)?,
            chromedriver: lookup("SNIPER_CHROMEDRIVER").unwrap_or(defaults.chromedriver),
            webdriver_port,
            headless,
            user_agent: lookup("SNIPER_USER_AGENT").unwrap_or(defaults.user_agent),
            cookie: lookup("SNIPER_COOKIE").ok().filter(|c| !c.trim().is_empty()),
        })
    }
}
