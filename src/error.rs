use std::fmt;

use thiserror::Error;

/// A single locator that was tried while looking for a price, and why it
/// produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorFailure {
    pub locator: String,
    pub reason: String,
}

impl fmt::Display for LocatorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.locator, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fetching {url} failed with status {status}: {reason}")]
    FetchFailed {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("locator {locator:?} selected nothing")]
    EmptyMatch { locator: String },

    #[error("can't parse product name on {url}")]
    NoName { url: String },

    #[error("can't parse product price on {url}:\n{}", join_lines(.attempts))]
    NoPriceFound {
        url: String,
        attempts: Vec<LocatorFailure>,
    },

    #[error("can't parse {input:?} as money")]
    NotMoney { input: String },

    #[error("captcha challenge on {url}")]
    Captcha { url: String },

    #[error("unable to find any product URLs on {url}")]
    NoResultsFound { url: String },

    #[error("could not parse best offer from sellers")]
    NoOfferFound,

    #[error("browser interaction failed during {step}: {reason}")]
    InteractionFailed { step: String, reason: String },

    #[error("invalid locator {locator:?}: {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("login requires an email and password when no browser profile is given")]
    MissingCredentials,
}

impl Error {
    pub(crate) fn interaction(step: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::InteractionFailed {
            step: step.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_captcha(&self) -> bool {
        matches!(self, Self::Captcha { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure to resolve one URL inside a batch. The batch keeps going.
#[derive(Debug)]
pub struct UrlFailure {
    pub url: String,
    pub error: Error,
}

/// Every per-URL failure of one batch, in the order they happened.
#[derive(Debug, Default)]
pub struct BatchError {
    pub failures: Vec<UrlFailure>,
}

impl BatchError {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn push(&mut self, url: impl Into<String>, error: Error) {
        self.failures.push(UrlFailure {
            url: url.into(),
            error,
        });
    }

    /// Failures whose error is a captcha challenge.
    pub fn captchas(&self) -> impl Iterator<Item = &UrlFailure> {
        self.failures.iter().filter(|f| f.error.is_captcha())
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "url {:?} : {}", failure.url, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

fn join_lines(attempts: &[LocatorFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
