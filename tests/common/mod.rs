//! Fixtures and in-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use cart_sniper::config::Config;
use cart_sniper::error::{Error, Result};
use cart_sniper::fetcher::{HttpFetcher, PageLoader};
use cart_sniper::parser::{PageLocators, ProductParser};
use cart_sniper::traits::{BrowserLauncher, BrowserSession, ElementHandle, FetchedPage, Locator, PageFetcher};

/// Default config without throttling, so tests do not sleep between fetches.
pub fn test_config() -> Config {
    Config {
        throttle: Duration::ZERO,
        http_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

pub fn test_loader() -> PageLoader {
    let fetcher = HttpFetcher::new(&test_config()).expect("failed to build test fetcher");
    PageLoader::new(Box::new(fetcher))
}

pub fn test_parser() -> ProductParser {
    ProductParser::new(&PageLocators::default()).expect("default locators must compile")
}

/// In-memory storefront for tests that must not touch sockets, such as
/// those running on paused time.
#[derive(Clone, Default)]
pub struct StaticPages {
    pages: Arc<Mutex<HashMap<String, String>>>,
}

impl StaticPages {
    pub fn page(self, url: &str, body: &str) -> Self {
        self.pages.lock().unwrap().insert(url.to_owned(), body.to_owned());
        self
    }

    pub fn loader(&self) -> PageLoader {
        PageLoader::new(Box::new(self.clone()))
    }
}

#[async_trait]
impl PageFetcher for StaticPages {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        Ok(match self.pages.lock().unwrap().get(url) {
            Some(body) => FetchedPage {
                status: 200,
                body: body.clone(),
            },
            None => FetchedPage {
                status: 404,
                body: "not found".to_owned(),
            },
        })
    }
}

/// Product page with the elements the parser reads. `None` leaves the
/// element out.
pub fn product_page(title: Option<&str>, price: Option<&str>, availability: &str, delivery: Option<&str>) -> String {
    let title = title
        .map(|t| format!(r#"<span id="productTitle" class="a-size-large">  {t}  </span>"#))
        .unwrap_or_default();
    let price = price
        .map(|p| format!(r#"<span id="price_inside_buybox" class="a-size-medium">{p}</span>"#))
        .unwrap_or_default();
    let delivery = delivery
        .map(|d| format!(r#"<div id="deliveryMessageMirId"><b>{d}</b></div>"#))
        .unwrap_or_default();
    format!(
        r#"<html><head><title>Product</title></head><body>
<div id="centerCol"><h1>{title}</h1></div>
<div id="buybox">{price}</div>
<div id="availability"><span class="a-size-medium a-color-success">
    {availability}
</span></div>
{delivery}
</body></html>"#
    )
}

/// Search results page listing `hrefs` inside the results grid.
pub fn results_page(hrefs: &[&str]) -> String {
    let anchors: String = hrefs
        .iter()
        .map(|href| format!(r#"<div class="s-result-item"><h2><a class="a-link-normal" href="{href}"><span>item</span></a></h2></div>"#))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"<html><body>
<div class="s-main-slot s-result-list s-search-results sg-row">
{anchors}
</div>
</body></html>"#
    )
}

pub const CHALLENGE_PAGE: &str = r#"<html><body>
<h4>Enter the characters you see below</h4>
<p>Sorry, we just need to make sure you're not a robot.</p>
<form action="/errors/validateCaptcha"><input id="captchacharacters"></form>
</body></html>"#;

/// Everything a [`ScriptedBrowser`] session did.
#[derive(Debug, Default)]
pub struct BrowserLog {
    pub opened: Vec<(String, Option<PathBuf>)>,
    pub navigations: Vec<String>,
    /// Locator (as displayed) of every clicked element.
    pub clicks: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub frames: Vec<String>,
    /// When each frame switch happened, on the tokio clock.
    pub frame_switched_at: Vec<tokio::time::Instant>,
    pub closed: u32,
}

/// Browser fake. Elements exist when their locator was registered with
/// [`ScriptedBrowser::with`]; lists return [`ScriptedBrowser::with_list`]
/// elements.
#[derive(Clone, Default)]
pub struct ScriptedBrowser {
    present: Arc<Mutex<HashSet<String>>>,
    lists: Arc<Mutex<HashMap<String, usize>>>,
    rendered: Arc<Mutex<HashMap<String, String>>>,
    pub log: Arc<Mutex<BrowserLog>>,
}

impl ScriptedBrowser {
    pub fn with(self, locators: &[Locator]) -> Self {
        self.present
            .lock()
            .unwrap()
            .extend(locators.iter().map(ToString::to_string));
        self
    }

    pub fn with_list(self, locator: &Locator, count: usize) -> Self {
        self.lists.lock().unwrap().insert(locator.to_string(), count);
        self
    }

    pub fn rendering(self, url: &str, html: &str) -> Self {
        self.rendered
            .lock()
            .unwrap()
            .insert(url.to_owned(), html.to_owned());
        self
    }

    pub fn clicks(&self) -> Vec<String> {
        self.log.lock().unwrap().clicks.clone()
    }

    pub fn opened(&self) -> usize {
        self.log.lock().unwrap().opened.len()
    }

    pub fn closed(&self) -> u32 {
        self.log.lock().unwrap().closed
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedBrowser {
    async fn open(&self, url: &str, profile_dir: Option<&Path>) -> Result<Box<dyn BrowserSession>> {
        self.log
            .lock()
            .unwrap()
            .opened
            .push((url.to_owned(), profile_dir.map(Path::to_path_buf)));
        Ok(Box::new(ScriptedSession {
            browser: self.clone(),
            current: url.to_owned(),
            handles: Vec::new(),
        }))
    }
}

struct ScriptedSession {
    browser: ScriptedBrowser,
    current: String,
    handles: Vec<String>,
}

impl ScriptedSession {
    fn handle(&mut self, description: String) -> ElementHandle {
        self.handles.push(description);
        ElementHandle(self.handles.len() - 1)
    }

    fn lookup(&mut self, locator: &Locator) -> Result<ElementHandle> {
        let key = locator.to_string();
        if self.browser.present.lock().unwrap().contains(&key) {
            Ok(self.handle(key))
        } else {
            Err(Error::InteractionFailed {
                step: format!("find {key}"),
                reason: "no such element".to_owned(),
            })
        }
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        url.clone_into(&mut self.current);
        self.browser.log.lock().unwrap().navigations.push(url.to_owned());
        Ok(())
    }

    async fn find_element(&mut self, locator: &Locator) -> Result<ElementHandle> {
        self.lookup(locator)
    }

    async fn find_elements(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let key = locator.to_string();
        let count = self.browser.lists.lock().unwrap().get(&key).copied().unwrap_or(0);
        Ok((0..count).map(|i| self.handle(format!("{key}#{i}"))).collect())
    }

    async fn find_child(&mut self, _parent: ElementHandle, locator: &Locator) -> Result<ElementHandle> {
        self.lookup(locator)
    }

    async fn click(&mut self, element: ElementHandle) -> Result<()> {
        let description = self.handles[element.0].clone();
        self.browser.log.lock().unwrap().clicks.push(description);
        Ok(())
    }

    async fn send_keys(&mut self, element: ElementHandle, text: &str) -> Result<()> {
        let description = self.handles[element.0].clone();
        self.browser
            .log
            .lock()
            .unwrap()
            .typed
            .push((description, text.to_owned()));
        Ok(())
    }

    async fn focus_frame(&mut self, name: &str) -> Result<()> {
        let mut log = self.browser.log.lock().unwrap();
        log.frames.push(name.to_owned());
        log.frame_switched_at.push(tokio::time::Instant::now());
        Ok(())
    }

    async fn rendered_html(&mut self) -> Result<String> {
        Ok(self
            .browser
            .rendered
            .lock()
            .unwrap()
            .get(&self.current)
            .cloned()
            .unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.browser.log.lock().unwrap().closed += 1;
        Ok(())
    }
}
