use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator as WdLocator};
use serde_json::json;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::retry::{Backoff, retry_with_backoff};
use crate::traits::{BrowserLauncher, BrowserSession, ElementHandle, Locator};

/// Starts a local chromedriver per session and drives it with `fantoccini`.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    chromedriver: String,
    port: u16,
    headless: bool,
    connect: Backoff,
}

impl WebDriverLauncher {
    pub fn new(config: &Config) -> Self {
        Self {
            chromedriver: config.chromedriver.clone(),
            port: config.webdriver_port,
            headless: config.headless,
            connect: Backoff::new(std::time::Duration::from_secs(10), std::time::Duration::from_millis(50)),
        }
    }

    fn capabilities(&self, profile_dir: Option<&Path>) -> serde_json::Map<String, serde_json::Value> {
        let mut args = Vec::new();
        if let Some(dir) = profile_dir {
            args.push(format!("user-data-dir={}", dir.display()));
        }
        if self.headless {
            args.push("--headless=new".to_owned());
        }

        let mut caps = serde_json::Map::new();
        caps.insert("platformName".to_owned(), json!("linux"));
        caps.insert("goog:chromeOptions".to_owned(), json!({ "args": args }));
        caps
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn open(&self, url: &str, profile_dir: Option<&Path>) -> Result<Box<dyn BrowserSession>> {
        info!("Starting {} on port {}", self.chromedriver, self.port);
        let mut driver = Command::new(&self.chromedriver)
            .arg(format!("--port={}", self.port))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::interaction("start webdriver", e))?;

        let webdriver_url = format!("http://localhost:{}", self.port);
        let caps = self.capabilities(profile_dir);
        let connected = retry_with_backoff(self.connect, || {
            let caps = caps.clone();
            let webdriver_url = webdriver_url.clone();
            async move {
                let mut builder = ClientBuilder::native();
                builder.capabilities(caps);
                builder.connect(&webdriver_url).await
            }
        })
        .await;

        let client = match connected {
            Ok(client) => client,
            Err(e) => {
                if let Err(kill) = driver.kill().await {
                    warn!("Failed to stop webdriver: {}", kill);
                }
                return Err(Error::interaction("connect webdriver", e));
            }
        };

        let mut session = WebDriverSession {
            client: Some(client),
            driver: Some(driver),
            elements: Vec::new(),
        };
        if let Err(e) = session.navigate(url).await {
            if let Err(close) = Box::new(session).close().await {
                warn!("Failed to close browser session: {}", close);
            }
            return Err(e);
        }

        info!("Browser session open on {}", url);
        Ok(Box::new(session))
    }
}

/// A live WebDriver session. Element handles index into the elements found
/// so far in this session.
pub struct WebDriverSession {
    client: Option<Client>,
    driver: Option<Child>,
    elements: Vec<Element>,
}

impl WebDriverSession {
    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::interaction("session", "browser session already closed"))
    }

    fn element(&self, handle: ElementHandle) -> Result<&Element> {
        self.elements
            .get(handle.0)
            .ok_or_else(|| Error::interaction("element", format!("unknown element handle {}", handle.0)))
    }

    fn remember(&mut self, element: Element) -> ElementHandle {
        self.elements.push(element);
        ElementHandle(self.elements.len() - 1)
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.client()?
            .goto(url)
            .await
            .map_err(|e| Error::interaction(format!("navigate to {url}"), e))
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle> {
        let css = locator.to_css();
        let element = self
            .client()?
            .find(WdLocator::Css(&css))
            .await
            .map_err(|e| Error::interaction(format!("find {locator}"), e))?;
        Ok(self.remember(element))
    }

    async fn find_elements(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let css = locator.to_css();
        let elements = self
            .client()?
            .find_all(WdLocator::Css(&css))
            .await
            .map_err(|e| Error::interaction(format!("find all {locator}"), e))?;
        Ok(elements.into_iter().map(|e| self.remember(e)).collect())
    }

    async fn find_child(&mut self, parent: ElementHandle, locator: &Locator) -> Result<ElementHandle> {
        let css = locator.to_css();
        let element = self
            .element(parent)?
            .find(WdLocator::Css(&css))
            .await
            .map_err(|e| Error::interaction(format!("find {locator} in element {}", parent.0), e))?;
        Ok(self.remember(element))
    }

    async fn click(&mut self, element: ElementHandle) -> Result<()> {
        self.element(element)?
            .click()
            .await
            .map_err(|e| Error::interaction(format!("click element {}", element.0), e))
    }

    async fn send_keys(&mut self, element: ElementHandle, text: &str) -> Result<()> {
        self.element(element)?
            .send_keys(text)
            .await
            .map_err(|e| Error::interaction(format!("type into element {}", element.0), e))
    }

    async fn focus_frame(&mut self, name: &str) -> Result<()> {
        let css = format!("iframe[name=\"{name}\"], iframe#{name}");
        let frame = self
            .client()?
            .find(WdLocator::Css(&css))
            .await
            .map_err(|e| Error::interaction(format!("find frame {name}"), e))?;
        frame
            .enter_frame()
            .await
            .map(|_| ())
            .map_err(|e| Error::interaction(format!("switch to frame {name}"), e))
    }

    async fn rendered_html(&mut self) -> Result<String> {
        self.client()?
            .source()
            .await
            .map_err(|e| Error::interaction("read page source", e))
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.elements.clear();
        let closed = match self.client.take() {
            Some(client) => client
                .close()
                .await
                .map_err(|e| Error::interaction("close session", e)),
            None => Ok(()),
        };

        if let Some(mut driver) = self.driver.take() {
            info!("Stopping webdriver");
            if let Err(e) = driver.kill().await {
                warn!("Failed to stop webdriver: {}", e);
            }
        }

        closed
    }
}
