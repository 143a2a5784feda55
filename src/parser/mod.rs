//! Product page parsing.
//!
//! Prices are tried against an ordered locator table. When every locator on
//! the product page fails, the offer-listing page for the same product is
//! fetched and tried once more; the final error lists every attempt.

mod locators;

use std::sync::LazyLock;

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::error::{Error, LocatorFailure, Result};
use crate::models::{Money, Product};
use crate::normalize::{normalize_whitespace, parse_money};
use crate::traits::PageSource;

pub use locators::PageLocators;

/// Lowercase markers in the visible text of captcha or automation-detection
/// pages.
const BOT_CHALLENGE_MARKERS: &[&str] = &["captcha", "automated access"];

/// Markup only challenge pages carry: the captcha form and its input.
static BOT_CHALLENGE_MARKUP: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"form[action*="validateCaptcha"], form[action*="validatecaptcha"], #captchacharacters"#).unwrap()
});

/// True when `html` is a bot challenge rather than real page markup.
///
/// Scripts and styles are ignored, so a product page that merely loads a
/// captcha widget is not a challenge.
pub fn detect_bot_challenge(html: &str) -> bool {
    let document = Html::parse_document(html);
    if document.select(&BOT_CHALLENGE_MARKUP).next().is_some() {
        return true;
    }
    let text = visible_text(document.root_element()).to_lowercase();
    BOT_CHALLENGE_MARKERS.iter().any(|m| text.contains(m))
}

/// A CSS selector together with its source text, kept for diagnostics.
#[derive(Debug, Clone)]
struct CompiledLocator {
    source: String,
    selector: Selector,
}

impl CompiledLocator {
    fn compile(source: &str) -> Result<Self> {
        let selector = Selector::parse(source).map_err(|e| Error::InvalidLocator {
            locator: source.to_owned(),
            reason: format!("{e:?}"),
        })?;
        Ok(Self {
            source: source.to_owned(),
            selector,
        })
    }
}

/// Availability and delivery text of a product page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingDetails {
    pub availability: String,
    pub delivery: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProductParser {
    title: CompiledLocator,
    prices: Vec<CompiledLocator>,
    offer_listing_price: CompiledLocator,
    availability: CompiledLocator,
    delivery: CompiledLocator,
    result_links: CompiledLocator,
}

impl ProductParser {
    /// # Errors
    ///
    /// Returns [`Error::InvalidLocator`] if any locator is not valid CSS.
    pub fn new(locators: &PageLocators) -> Result<Self> {
        Ok(Self {
            title: CompiledLocator::compile(&locators.title)?,
            prices: locators
                .prices
                .iter()
                .map(|p| CompiledLocator::compile(p))
                .collect::<Result<_>>()?,
            offer_listing_price: CompiledLocator::compile(&locators.offer_listing_price)?,
            availability: CompiledLocator::compile(&locators.availability)?,
            delivery: CompiledLocator::compile(&locators.delivery)?,
            result_links: CompiledLocator::compile(&locators.result_links)?,
        })
    }

    /// Parses name and price of the product page at `page_url`. `source` is
    /// only used for the offer-listing fallback.
    ///
    /// # Errors
    ///
    /// [`Error::NoName`] without a title, [`Error::NoPriceFound`] when every
    /// price strategy failed.
    pub async fn parse_product<S>(&self, html: &str, page_url: &str, source: &mut S) -> Result<Product>
    where
        S: PageSource + ?Sized,
    {
        // The document is not Send; keep it out of scope across awaits.
        let (name, first_pass) = {
            let document = Html::parse_document(html);
            let name = extract_text(&document, &self.title).map_err(|_| Error::NoName {
                url: page_url.to_owned(),
            })?;
            (name, self.price_from_document(&document))
        };

        let price = match first_pass {
            Ok(price) => price,
            Err(attempts) => self.price_with_fallback(page_url, attempts, source).await?,
        };

        Ok(Product {
            url: page_url.to_owned(),
            name,
            price,
        })
    }

    /// Price of the product page at `page_url`, falling back to its offer
    /// listing.
    ///
    /// # Errors
    ///
    /// [`Error::NoPriceFound`] carrying every attempted locator.
    pub async fn parse_price<S>(&self, html: &str, page_url: &str, source: &mut S) -> Result<Money>
    where
        S: PageSource + ?Sized,
    {
        let first_pass = {
            let document = Html::parse_document(html);
            self.price_from_document(&document)
        };

        match first_pass {
            Ok(price) => Ok(price),
            Err(attempts) => self.price_with_fallback(page_url, attempts, source).await,
        }
    }

    /// Walks the price locator table against `document`.
    ///
    /// # Errors
    ///
    /// One [`LocatorFailure`] per locator when none produced money.
    pub fn price_from_document(&self, document: &Html) -> Result<Money, Vec<LocatorFailure>> {
        let mut failures = Vec::with_capacity(self.prices.len());

        for locator in &self.prices {
            match price_at(document, locator) {
                Ok(price) => {
                    debug!("Price {} found with {}", price, locator.source);
                    return Ok(price);
                }
                Err(failure) => failures.push(failure),
            }
        }

        Err(failures)
    }

    async fn price_with_fallback<S>(
        &self,
        page_url: &str,
        mut attempts: Vec<LocatorFailure>,
        source: &mut S,
    ) -> Result<Money>
    where
        S: PageSource + ?Sized,
    {
        let fallback = match offer_listing_url(page_url) {
            Ok(listing_url) => {
                debug!("No price on {}, trying offer listing {}", page_url, listing_url);
                self.offer_listing_price(&listing_url, source).await
            }
            Err(e) => Err(LocatorFailure {
                locator: "offer listing".to_owned(),
                reason: e.to_string(),
            }),
        };

        match fallback {
            Ok(price) => Ok(price),
            Err(failure) => {
                attempts.push(failure);
                warn!("No price found on {} after {} attempts", page_url, attempts.len());
                Err(Error::NoPriceFound {
                    url: page_url.to_owned(),
                    attempts,
                })
            }
        }
    }

    async fn offer_listing_price<S>(&self, listing_url: &str, source: &mut S) -> Result<Money, LocatorFailure>
    where
        S: PageSource + ?Sized,
    {
        let html = source.load(listing_url).await.map_err(|e| LocatorFailure {
            locator: format!("offer listing {listing_url}"),
            reason: e.to_string(),
        })?;
        let document = Html::parse_document(&html);
        price_at(&document, &self.offer_listing_price)
    }

    /// Availability and delivery text of a product page.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyMatch`] when the availability block is missing or empty.
    /// A missing delivery estimate is not an error.
    pub fn listing_details(&self, document: &Html) -> Result<ListingDetails> {
        let availability = extract_text(document, &self.availability)?;
        let delivery = extract_text(document, &self.delivery).ok();
        Ok(ListingDetails {
            availability,
            delivery,
        })
    }

    /// Raw `href` values of the anchors inside the search results list.
    pub fn result_links(&self, document: &Html) -> Vec<String> {
        document
            .select(&self.result_links.selector)
            .filter_map(|a| a.value().attr("href"))
            .map(str::to_owned)
            .collect()
    }
}

/// Derives the offer-listing URL from the last path segment of a product URL.
///
/// # Errors
///
/// [`Error::InvalidUrl`] when `page_url` has no host or no path segment.
pub fn offer_listing_url(page_url: &str) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidUrl {
        url: page_url.to_owned(),
        reason: reason.to_owned(),
    };

    let url = Url::parse(page_url).map_err(|e| invalid(&e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    let product_id = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .ok_or_else(|| invalid("missing product path segment"))?;

    Ok(format!(
        "{}/gp/offer-listing/{}",
        url.origin().ascii_serialization(),
        product_id
    ))
}

/// Whitespace-normalized text of the first node matching `locator`, with
/// script and style subtrees left out.
fn extract_text(document: &Html, locator: &CompiledLocator) -> Result<String> {
    let text = document
        .select(&locator.selector)
        .next()
        .map(|element| normalize_whitespace(&visible_text(element)))
        .unwrap_or_default();

    if text.is_empty() {
        return Err(Error::EmptyMatch {
            locator: locator.source.clone(),
        });
    }
    Ok(text)
}

fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let inside_script = node
            .ancestors()
            .take_while(|a| a.id() != element.id())
            .any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| matches!(e.name(), "script" | "style"))
            });
        if !inside_script {
            out.push_str(text);
        }
    }
    out
}

fn price_at(document: &Html, locator: &CompiledLocator) -> Result<Money, LocatorFailure> {
    let failure = |reason: String| LocatorFailure {
        locator: locator.source.clone(),
        reason,
    };
    let text = extract_text(document, locator).map_err(|_| failure("selected nothing".to_owned()))?;
    parse_money(&text).map_err(|e| failure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::fetcher::testing::FixtureFetcher;

    fn parser() -> ProductParser {
        ProductParser::new(&PageLocators::default()).unwrap()
    }

    fn money(s: &str) -> Money {
        Money::new(Decimal::from_str(s).unwrap()).unwrap()
    }

    fn page(body: &str) -> String {
        format!("<html><head><title>shop</title></head><body>{body}</body></html>")
    }

    #[test]
    fn extract_text_skips_scripts_and_normalizes() {
        let html = page(
            r#"<div id="availability">
                 <span>  In
                   Stock. </span>
                 <script>var tracking = "captcha-free";</script>
               </div>"#,
        );
        let document = Html::parse_document(&html);
        let locator = CompiledLocator::compile("#availability").unwrap();
        assert_eq!(extract_text(&document, &locator).unwrap(), "In Stock.");
    }

    #[test]
    fn extract_text_fails_on_empty_match() {
        let document = Html::parse_document(&page(r#"<div id="availability"> <script>x()</script> </div>"#));
        let locator = CompiledLocator::compile("#availability").unwrap();
        assert!(matches!(
            extract_text(&document, &locator),
            Err(Error::EmptyMatch { .. })
        ));
        let missing = CompiledLocator::compile("#nope").unwrap();
        assert!(extract_text(&document, &missing).is_err());
    }

    #[test]
    fn each_price_locator_is_recognized() {
        let fixtures = [
            r#"<span id="price_inside_buybox">$939.99</span>"#,
            r#"<span id="priceblock_ourprice">$939.99</span>"#,
            r#"<span id="style_name_0_price"><span>$939.99</span></span>"#,
            r#"<div id="olp-upd-new"><span><a><span class="a-size-base a-color-price">$939.99</span></a></span></div>"#,
            r#"<div id="olp-upd-new-used">New &amp; Used (3) from $939.99</div>"#,
            r#"<div id="olp-upd-used">Used (1) from $939.99</div>"#,
        ];
        let parser = parser();
        for fixture in fixtures {
            let document = Html::parse_document(&page(fixture));
            assert_eq!(
                parser.price_from_document(&document).unwrap(),
                money("939.99"),
                "{fixture}"
            );
        }
    }

    #[test]
    fn earlier_locator_wins() {
        let document = Html::parse_document(&page(
            r#"<span id="priceblock_ourprice">$20.00</span><span id="price_inside_buybox">$10.00</span>"#,
        ));
        assert_eq!(parser().price_from_document(&document).unwrap(), money("10.00"));
    }

    #[test]
    fn unparseable_price_records_reason_and_moves_on() {
        let document = Html::parse_document(&page(
            r#"<span id="price_inside_buybox">See price in cart</span><span id="olp-upd-used">$5.00</span>"#,
        ));
        assert_eq!(parser().price_from_document(&document).unwrap(), money("5.00"));

        let document = Html::parse_document(&page(r#"<span id="price_inside_buybox">free</span>"#));
        let failures = parser().price_from_document(&document).unwrap_err();
        assert_eq!(failures.len(), PageLocators::default().prices.len());
        assert!(failures[0].reason.contains("money"));
        assert_eq!(failures[1].reason, "selected nothing");
    }

    #[test]
    fn offer_listing_url_uses_last_path_segment() {
        assert_eq!(
            offer_listing_url("https://www.amazon.com/MSI-GeForce-RTX-3070-Architecture/dp/B08KWN2LZG").unwrap(),
            "https://www.amazon.com/gp/offer-listing/B08KWN2LZG"
        );
        assert_eq!(
            offer_listing_url("http://127.0.0.1:8080/dp/B08KWN2LZG/").unwrap(),
            "http://127.0.0.1:8080/gp/offer-listing/B08KWN2LZG"
        );
        assert!(offer_listing_url("https://www.amazon.com/").is_err());
        assert!(offer_listing_url("not a url").is_err());
    }

    #[test]
    fn bot_challenge_markers() {
        assert!(detect_bot_challenge("<form action=\"/errors/validateCaptcha\">"));
        assert!(detect_bot_challenge("To discuss automated access to Amazon data please contact"));
        assert!(detect_bot_challenge(r#"<html><body><input id="captchacharacters" name="field-keywords"></body></html>"#));
        assert!(!detect_bot_challenge(&page(r#"<span id="productTitle">RTX 3070</span>"#)));
    }

    #[test]
    fn captcha_widget_scripts_are_not_a_challenge() {
        let html = r#"<html><head>
            <script src="https://www.google.com/recaptcha/api.js" async defer></script>
            <script>window.captchaConfig = { automatedAccess: false };</script>
            <style>.g-recaptcha { display: none; }</style>
          </head><body><span id="productTitle">RTX 3070</span></body></html>"#;
        assert!(!detect_bot_challenge(html));
    }

    #[tokio::test]
    async fn parse_product_reads_name_and_price() {
        let html = page(
            r#"<span id="productTitle">
                 PNY GeForce RTX 3070 8GB
               </span>
               <span id="priceblock_ourprice">$949.99</span>"#,
        );
        let mut source = FixtureFetcher::default();
        let product = parser()
            .parse_product(&html, "https://shop.test/dp/B08HBJB7YD", &mut source)
            .await
            .unwrap();

        assert_eq!(product.name, "PNY GeForce RTX 3070 8GB");
        assert_eq!(product.price, money("949.99"));
        assert_eq!(product.url, "https://shop.test/dp/B08HBJB7YD");
        assert!(source.requested().is_empty(), "no fallback fetch expected");
    }

    #[tokio::test]
    async fn parse_product_requires_title() {
        let html = page(r#"<span id="priceblock_ourprice">$949.99</span>"#);
        let mut source = FixtureFetcher::default();
        let err = parser()
            .parse_product(&html, "https://shop.test/dp/A", &mut source)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoName { .. }));
    }

    #[tokio::test]
    async fn price_falls_back_to_offer_listing() {
        let listing = page(
            r#"<div id="olpOfferList"><div><div>
                 <div class="a-row a-spacing-mini olpOffer">
                   <div class="a-column a-span2 olpPriceColumn"><span> $899.00 </span></div>
                 </div>
               </div></div></div>"#,
        );
        let mut source = FixtureFetcher::default().page(
            "https://shop.test/gp/offer-listing/B08L8L9TCZ",
            200,
            &listing,
        );
        let html = page(r#"<span id="productTitle">EVGA RTX 3070</span>"#);

        let product = parser()
            .parse_product(&html, "https://shop.test/EVGA/dp/B08L8L9TCZ", &mut source)
            .await
            .unwrap();
        assert_eq!(product.price, money("899.00"));
        assert_eq!(source.requested(), vec!["https://shop.test/gp/offer-listing/B08L8L9TCZ"]);
    }

    #[tokio::test]
    async fn no_price_found_aggregates_every_attempt() {
        let mut source = FixtureFetcher::default();
        let html = page(r#"<span id="productTitle">EVGA RTX 3070</span>"#);

        let err = parser()
            .parse_price(&html, "https://shop.test/dp/B08L8L9TCZ", &mut source)
            .await
            .unwrap_err();

        match err {
            Error::NoPriceFound { attempts, .. } => {
                assert_eq!(attempts.len(), PageLocators::default().prices.len() + 1);
                assert!(attempts.last().unwrap().locator.contains("offer listing"));
            }
            other => panic!("expected NoPriceFound, got {other}"),
        }
    }

    #[test]
    fn listing_details_tolerates_missing_delivery() {
        let document = Html::parse_document(&page(
            r#"<div id="availability"><span>Available from these sellers.</span></div>"#,
        ));
        let details = parser().listing_details(&document).unwrap();
        assert_eq!(details.availability, "Available from these sellers.");
        assert!(details.delivery.is_none());
    }

    #[test]
    fn invalid_locator_is_rejected() {
        let locators = PageLocators {
            title: "##".to_owned(),
            ..PageLocators::default()
        };
        assert!(matches!(
            ProductParser::new(&locators),
            Err(Error::InvalidLocator { .. })
        ));
    }
}
