//! Ordered locator tables for product and listing pages.
//!
//! Update these when the storefront markup drifts; the parser only walks the
//! tables in order.

/// CSS locators used by [`super::ProductParser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocators {
    /// Product title on a product page.
    pub title: String,
    /// Price locators, highest priority first.
    pub prices: Vec<String>,
    /// Price of the best offer on the offer-listing page.
    pub offer_listing_price: String,
    /// Free-text availability block.
    pub availability: String,
    /// Delivery estimate block.
    pub delivery: String,
    /// Anchors inside the search results list.
    pub result_links: String,
}

impl Default for PageLocators {
    fn default() -> Self {
        Self {
            title: "#productTitle".to_owned(),
            prices: vec![
                // buy box
                "#price_inside_buybox".to_owned(),
                // "our price"
                "#priceblock_ourprice".to_owned(),
                // variant selector
                "#style_name_0_price".to_owned(),
                // new offers
                "#olp-upd-new > span > a > span.a-size-base.a-color-price".to_owned(),
                // new & used offers
                "#olp-upd-new-used".to_owned(),
                // used offers
                "#olp-upd-used".to_owned(),
            ],
            offer_listing_price: "#olpOfferList > div > div > div.a-row.a-spacing-mini.olpOffer > div.a-column.a-span2.olpPriceColumn > span".to_owned(),
            availability: "#availability".to_owned(),
            delivery: "#deliveryMessageMirId".to_owned(),
            result_links: ".s-main-slot.s-result-list.s-search-results.sg-row a".to_owned(),
        }
    }
}
