//! Browser-mimicking request headers for static fetches.

use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

const STATIC_HEADERS: &[(&str, &str)] = &[
    ("upgrade-insecure-requests", "1"),
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9",
    ),
    ("sec-fetch-site", "none"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-user", "?1"),
    ("sec-fetch-dest", "document"),
    ("rtt", "100"),
    ("downlink", "10"),
    ("ect", "4g"),
    ("accept-language", "en-US,en;q=0.9"),
];

/// Fixed header set attached to every static fetch. The user agent is set on
/// the client itself.
#[derive(Debug, Clone)]
pub struct BrowserHeaders {
    base: HeaderMap,
}

impl BrowserHeaders {
    pub fn new(cookie: Option<&str>) -> Self {
        let mut base = HeaderMap::new();
        for &(name, value) in STATIC_HEADERS {
            base.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        if let Some(cookie) = cookie {
            match HeaderValue::from_str(cookie) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    base.insert(reqwest::header::COOKIE, value);
                }
                Err(e) => warn!("Ignoring session cookie that is not a valid header: {}", e),
            }
        }

        Self { base }
    }

    /// Headers for a request to `url`; `authority` follows the URL host.
    pub fn for_url(&self, url: &str) -> HeaderMap {
        let mut headers = self.base.clone();
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned));
        if let Some(value) = host.and_then(|h| HeaderValue::from_str(&h).ok()) {
            headers.insert(HeaderName::from_static("authority"), value);
        }
        headers
    }
}
