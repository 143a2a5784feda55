//! Static page fetching, with a one-time fallback to a rendered browser
//! fetch when the static response is a bot challenge.

mod headers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::parser::detect_bot_challenge;
use crate::traits::{BrowserLauncher, BrowserSession, FetchedPage, PageFetcher, PageSource};

pub use headers::BrowserHeaders;

const BODY_SNIPPET_CHARS: usize = 200;

/// `reqwest`-backed fetcher that waits `throttle` before every request.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    headers: BrowserHeaders,
    throttle: Duration,
}

impl HttpFetcher {
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            client,
            headers: BrowserHeaders::new(config.cookie.as_deref()),
            throttle: config.throttle,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        if !self.throttle.is_zero() {
            tokio::time::sleep(self.throttle).await;
        }

        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .headers(self.headers.for_url(url))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(FetchedPage { status, body })
    }
}

/// Turns URLs into usable HTML. A static fetch that lands on a bot challenge
/// is retried exactly once through a rendered browser session, which is
/// opened lazily and reused for later challenges.
pub struct PageLoader {
    fetcher: Box<dyn PageFetcher>,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    browser: Option<Box<dyn BrowserSession>>,
    render_delay: Duration,
}

impl PageLoader {
    pub fn new(fetcher: Box<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            launcher: None,
            browser: None,
            render_delay: Duration::ZERO,
        }
    }

    /// Enables the rendered-browser fallback for bot challenges.
    #[must_use]
    pub fn with_browser_fallback(mut self, launcher: Arc<dyn BrowserLauncher>, render_delay: Duration) -> Self {
        self.launcher = Some(launcher);
        self.render_delay = render_delay;
        self
    }

    /// Static fetch without interpreting the page. Used where the caller
    /// must see the challenge page itself (search result listings).
    pub async fn fetch_raw(&self, url: &str) -> Result<FetchedPage> {
        self.fetcher.fetch(url).await
    }

    /// Loads `url` through the browser fallback.
    ///
    /// # Errors
    ///
    /// [`Error::Captcha`] if no fallback is configured or the rendered page is
    /// still a challenge.
    pub async fn render(&mut self, url: &str) -> Result<String> {
        let Some(launcher) = &self.launcher else {
            return Err(Error::Captcha { url: url.to_owned() });
        };

        info!("Bot challenge on {}, retrying through the browser", url);
        if let Some(browser) = self.browser.as_mut() {
            browser.navigate(url).await?;
        } else {
            let browser = launcher.open(url, None).await?;
            self.browser = Some(browser);
        }

        if !self.render_delay.is_zero() {
            tokio::time::sleep(self.render_delay).await;
        }

        let browser = self
            .browser
            .as_mut()
            .ok_or_else(|| Error::interaction("render", "browser session missing"))?;
        let html = browser.rendered_html().await?;

        if detect_bot_challenge(&html) {
            warn!("Rendered page for {} is still a bot challenge", url);
            return Err(Error::Captcha { url: url.to_owned() });
        }
        Ok(html)
    }

    /// Releases the fallback browser, if one was opened.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(browser) = self.browser.take() {
            info!("Closing fallback browser session");
            browser.close().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PageSource for PageLoader {
    async fn load(&mut self, url: &str) -> Result<String> {
        let page = self.fetcher.fetch(url).await?;

        if detect_bot_challenge(&page.body) {
            return self.render(url).await;
        }

        if !page.is_ok() {
            return Err(Error::FetchFailed {
                url: url.to_owned(),
                status: page.status,
                reason: page.body.chars().take(BODY_SNIPPET_CHARS).collect(),
            });
        }

        Ok(page.body)
    }
}
