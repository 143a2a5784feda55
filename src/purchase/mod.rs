//! One-shot purchase of a product page through a remote browser.
//!
//! The page is fetched and parsed first; out-of-stock and over-budget
//! products end there without a browser. Otherwise a session is opened and
//! driven through the checkout states below until the order is placed, or
//! until the place-order control is reached on a dry run.
//!
//! ```text
//! Start -> LoggedIn | AnonymousSession
//!       -> FlowSelected(BuyNow | SellerListing)
//!       -> CartUpdated                       (seller listing only)
//!       -> CheckoutReached
//!       -> Committed | DryRunStopped
//! ```

mod locators;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::config::Pacing;
use crate::error::{Error, Result};
use crate::fetcher::PageLoader;
use crate::models::{Availability, Money, Purchase};
use crate::parser::{ListingDetails, ProductParser};
use crate::retry::Backoff;
use crate::traits::{BrowserLauncher, BrowserSession, ElementHandle, Locator, PageSource};

pub use locators::CheckoutLocators;

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub link: String,
    pub max_price: Money,
    /// Needed unless `profile_dir` holds a signed-in browser profile.
    pub credentials: Option<Credentials>,
    pub profile_dir: Option<PathBuf>,
    /// Walk every checkout step but never place the order.
    pub dry_run: bool,
}

/// Checkout procedure chosen from the availability of the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutFlow {
    BuyNow,
    SellerListing,
}

impl CheckoutFlow {
    pub fn for_availability(availability: Availability) -> Self {
        match availability {
            Availability::MultiSeller => Self::SellerListing,
            Availability::InStock | Availability::OutOfStock | Availability::Unknown => Self::BuyNow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutState {
    Start,
    LoggedIn,
    /// Session restored from a browser profile; no login performed.
    AnonymousSession,
    FlowSelected(CheckoutFlow),
    CartUpdated,
    /// The place-order control is on screen.
    CheckoutReached(ElementHandle),
    Committed,
    DryRunStopped,
}

impl CheckoutState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::DryRunStopped)
    }
}

pub struct PurchaseOrchestrator {
    loader: PageLoader,
    parser: ProductParser,
    launcher: Arc<dyn BrowserLauncher>,
    locators: CheckoutLocators,
    pacing: Pacing,
    element_wait: Backoff,
}

impl PurchaseOrchestrator {
    pub fn new(loader: PageLoader, parser: ProductParser, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            loader,
            parser,
            launcher,
            locators: CheckoutLocators::default(),
            pacing: Pacing::default(),
            element_wait: Backoff::new(Duration::from_secs(10), Duration::from_millis(10)),
        }
    }

    #[must_use]
    pub fn with_locators(mut self, locators: CheckoutLocators) -> Self {
        self.locators = locators;
        self
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// How long element lookups keep polling before the step fails.
    #[must_use]
    pub fn with_element_wait(mut self, element_wait: Backoff) -> Self {
        self.element_wait = element_wait;
        self
    }

    /// Buys `request.link` if it is in stock and within budget.
    ///
    /// Out of stock and over budget are returned as `bought: false`, not as
    /// errors. The browser session is closed on every path.
    ///
    /// # Errors
    ///
    /// Page fetch and parse errors, [`Error::MissingCredentials`] when a login
    /// is needed but no credentials were given, [`Error::NoOfferFound`] and
    /// [`Error::InteractionFailed`] from the checkout itself.
    pub async fn purchase(&mut self, request: &PurchaseRequest) -> Result<Purchase> {
        info!("Checking {} (max {})", request.link, request.max_price);
        let html = self.loader.load(&request.link).await?;

        let details = {
            let document = Html::parse_document(&html);
            self.parser.listing_details(&document)?
        };
        let ListingDetails {
            availability: stock,
            delivery,
        } = details;
        let delivery = delivery.unwrap_or_else(|| {
            warn!("No delivery estimate on {}", request.link);
            String::new()
        });

        let availability = Availability::classify(&stock);
        if availability == Availability::OutOfStock {
            info!("No stock for {}: {:?}", request.link, stock);
            return Ok(Purchase {
                bought: false,
                reason: Purchase::NO_STOCK.to_owned(),
                stock,
                price: None,
                delivery,
                dry_run: request.dry_run,
            });
        }

        let price = self
            .parser
            .parse_price(&html, &request.link, &mut self.loader)
            .await?;
        if price > request.max_price {
            info!("Price {} of {} is above {}", price, request.link, request.max_price);
            return Ok(Purchase {
                bought: false,
                reason: Purchase::PRICE_TOO_HIGH.to_owned(),
                stock,
                price: Some(price),
                delivery,
                dry_run: request.dry_run,
            });
        }

        if request.profile_dir.is_none() && request.credentials.is_none() {
            return Err(Error::MissingCredentials);
        }

        let flow = CheckoutFlow::for_availability(availability);
        info!(
            "Buying {} at {} via {:?}{}",
            request.link,
            price,
            flow,
            if request.dry_run { " (dry run)" } else { "" }
        );

        let mut session = self
            .launcher
            .open(&request.link, request.profile_dir.as_deref())
            .await?;
        let outcome = self.checkout(session.as_mut(), request, flow).await;
        let closed = session.close().await;

        let final_state = match (outcome, closed) {
            (Ok(state), Ok(())) => state,
            (Ok(state), Err(e)) => {
                warn!("Checkout finished but the browser did not close cleanly: {}", e);
                state
            }
            (Err(e), Ok(())) => return Err(e),
            (Err(e), Err(close)) => {
                warn!("Failed to close browser after checkout error: {}", close);
                return Err(e);
            }
        };
        info!("Checkout of {} ended in {:?}", request.link, final_state);

        Ok(Purchase {
            bought: true,
            reason: Purchase::CONDITIONS_MET.to_owned(),
            stock,
            price: Some(price),
            delivery,
            dry_run: request.dry_run,
        })
    }

    /// Releases the fallback browser of the page loader, if one was opened.
    pub async fn close(&mut self) -> Result<()> {
        self.loader.close().await
    }

    async fn checkout(
        &self,
        session: &mut dyn BrowserSession,
        request: &PurchaseRequest,
        flow: CheckoutFlow,
    ) -> Result<CheckoutState> {
        self.pace(self.pacing.step).await;

        let mut state = CheckoutState::Start;
        while !state.is_terminal() {
            let next = self.advance(session, state, request, flow).await?;
            debug!("checkout {:?} -> {:?}", state, next);
            state = next;
        }
        Ok(state)
    }

    async fn advance(
        &self,
        session: &mut dyn BrowserSession,
        state: CheckoutState,
        request: &PurchaseRequest,
        flow: CheckoutFlow,
    ) -> Result<CheckoutState> {
        let next = match state {
            CheckoutState::Start => match (&request.profile_dir, &request.credentials) {
                (Some(_), _) => CheckoutState::AnonymousSession,
                (None, Some(credentials)) => {
                    self.login(session, credentials).await?;
                    CheckoutState::LoggedIn
                }
                (None, None) => return Err(Error::MissingCredentials),
            },
            CheckoutState::LoggedIn | CheckoutState::AnonymousSession => CheckoutState::FlowSelected(flow),
            CheckoutState::FlowSelected(CheckoutFlow::SellerListing) => {
                self.add_best_offer_to_cart(session).await?;
                CheckoutState::CartUpdated
            }
            CheckoutState::FlowSelected(CheckoutFlow::BuyNow) => {
                CheckoutState::CheckoutReached(self.open_buy_now_checkout(session).await?)
            }
            CheckoutState::CartUpdated => {
                CheckoutState::CheckoutReached(self.open_cart_checkout(session, &request.link).await?)
            }
            CheckoutState::CheckoutReached(_) if request.dry_run => {
                info!("Dry run, leaving the order unplaced");
                CheckoutState::DryRunStopped
            }
            CheckoutState::CheckoutReached(place_order) => {
                self.click(session, place_order, "place order").await?;
                self.pace(self.pacing.step).await;
                info!("Order placed for {}", request.link);
                CheckoutState::Committed
            }
            CheckoutState::Committed | CheckoutState::DryRunStopped => state,
        };
        Ok(next)
    }

    async fn login(&self, session: &mut dyn BrowserSession, credentials: &Credentials) -> Result<()> {
        info!("Signing in as {}", credentials.email);
        let l = &self.locators;

        let menu = self.wait_for(session, None, &l.account_menu).await?;
        self.click(session, menu, "open account menu").await?;
        self.pace(self.pacing.step).await;

        let email = self.wait_for(session, None, &l.email_input).await?;
        self.type_into(session, email, &credentials.email, "enter email").await?;
        self.pace(self.pacing.step).await;

        let next = self.wait_for(session, None, &l.continue_button).await?;
        self.click(session, next, "continue").await?;
        self.pace(self.pacing.step).await;

        let password = self.wait_for(session, None, &l.password_input).await?;
        self.type_into(session, password, &credentials.password, "enter password").await?;
        self.pace(self.pacing.step).await;

        let submit = self.wait_for(session, None, &l.sign_in_button).await?;
        self.click(session, submit, "sign in").await?;
        self.pace(self.pacing.step).await;
        Ok(())
    }

    async fn add_best_offer_to_cart(&self, session: &mut dyn BrowserSession) -> Result<()> {
        let l = &self.locators;

        let choices = self.wait_for(session, None, &l.see_all_buying_choices).await?;
        self.click(session, choices, "see all buying choices").await?;
        self.pace(self.pacing.step).await;

        let offer = self.best_offer(session).await?;
        let add = self.wait_for(session, Some(offer), &l.add_to_cart).await?;
        self.click(session, add, "add offer to cart").await?;
        self.pace(self.pacing.step).await;
        Ok(())
    }

    /// First offer of the all-offers display, or of the legacy offer list.
    async fn best_offer(&self, session: &mut dyn BrowserSession) -> Result<ElementHandle> {
        for locator in [&self.locators.offers, &self.locators.legacy_offers] {
            let offers = session
                .find_elements(locator)
                .await
                .map_err(|e| Error::interaction("list offers", e))?;
            if let Some(&first) = offers.first() {
                debug!("{} offers under {}", offers.len(), locator);
                return Ok(first);
            }
        }
        Err(Error::NoOfferFound)
    }

    async fn open_cart_checkout(&self, session: &mut dyn BrowserSession, link: &str) -> Result<ElementHandle> {
        let cart = cart_url(link, &self.locators.cart_path)?;
        session.navigate(&cart).await?;
        self.pace(self.pacing.step).await;

        let proceed = self
            .wait_for(session, None, &self.locators.proceed_to_checkout)
            .await?;
        self.click(session, proceed, "proceed to checkout").await?;
        self.pace(self.pacing.step).await;

        self.wait_for(session, None, &self.locators.place_order).await
    }

    async fn open_buy_now_checkout(&self, session: &mut dyn BrowserSession) -> Result<ElementHandle> {
        let buy_now = self.wait_for(session, None, &self.locators.buy_now).await?;
        self.click(session, buy_now, "buy now").await?;
        self.pace(self.pacing.checkout_widget).await;

        session.focus_frame(&self.locators.checkout_frame).await?;
        self.pace(self.pacing.step).await;
        self.wait_for(session, None, &self.locators.frame_place_order)
            .await
    }

    /// Polls for `locator`, within `parent` if given, until it appears or the
    /// element wait runs out.
    async fn wait_for(
        &self,
        session: &mut dyn BrowserSession,
        parent: Option<ElementHandle>,
        locator: &Locator,
    ) -> Result<ElementHandle> {
        let mut poller = self.element_wait.start();
        loop {
            let found = match parent {
                Some(parent) => session.find_child(parent, locator).await,
                None => session.find_element(locator).await,
            };
            match found {
                Ok(element) => return Ok(element),
                Err(e) => {
                    if !poller.wait().await {
                        debug!("gave up on {} after {} attempts", locator, poller.attempts());
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn click(&self, session: &mut dyn BrowserSession, element: ElementHandle, step: &str) -> Result<()> {
        debug!("click: {}", step);
        session
            .click(element)
            .await
            .map_err(|e| Error::interaction(step, e))
    }

    async fn type_into(
        &self,
        session: &mut dyn BrowserSession,
        element: ElementHandle,
        text: &str,
        step: &str,
    ) -> Result<()> {
        debug!("type: {}", step);
        session
            .send_keys(element, text)
            .await
            .map_err(|e| Error::interaction(step, e))
    }

    async fn pace(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Cart page on the same storefront as `link`.
fn cart_url(link: &str, cart_path: &str) -> Result<String> {
    let url = Url::parse(link).map_err(|e| Error::InvalidUrl {
        url: link.to_owned(),
        reason: e.to_string(),
    })?;
    if !url.has_host() {
        return Err(Error::InvalidUrl {
            url: link.to_owned(),
            reason: "no host".to_owned(),
        });
    }
    Ok(format!("{}{}", url.origin().ascii_serialization(), cart_path))
}
