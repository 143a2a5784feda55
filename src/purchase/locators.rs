use crate::traits::Locator;

/// Elements the checkout flows interact with, in the order they are used.
#[derive(Debug, Clone)]
pub struct CheckoutLocators {
    /// Account menu link that leads to the sign-in form
    pub account_menu: Locator,
    /// Email field of the first sign-in step
    pub email_input: Locator,
    /// Moves from the email step to the password step
    pub continue_button: Locator,
    pub password_input: Locator,
    /// Submits the password and ends the login
    pub sign_in_button: Locator,

    /// Opens the offer display of a multi-seller product
    pub see_all_buying_choices: Locator,
    /// Offers of the current all-offers display.
    pub offers: Locator,
    /// Offers of the legacy offer-list page; tried when `offers` finds none.
    pub legacy_offers: Locator,
    /// Add-to-cart control inside an offer.
    pub add_to_cart: Locator,
    /// Path of the cart page, relative to the storefront origin.
    pub cart_path: String,
    /// Cart page button leading to checkout
    pub proceed_to_checkout: Locator,
    /// Final order button of the full checkout page. Never clicked on a dry run.
    pub place_order: Locator,

    /// Buy-now button of a single-seller product page
    pub buy_now: Locator,
    /// Name of the embedded checkout frame opened by buy now.
    pub checkout_frame: String,
    /// Order button inside `checkout_frame`. Never clicked on a dry run.
    pub frame_place_order: Locator,
}

impl Default for CheckoutLocators {
    fn default() -> Self {
        Self {
            account_menu: Locator::id("nav-link-accountList"),
            email_input: Locator::id("ap_email"),
            continue_button: Locator::id("continue"),
            password_input: Locator::id("ap_password"),
            sign_in_button: Locator::id("signInSubmit"),

            see_all_buying_choices: Locator::id("buybox-see-all-buying-choices"),
            offers: Locator::id("aod-offer"),
            legacy_offers: Locator::css("#olpOfferList > div > div > div"),
            add_to_cart: Locator::name("submit.addToCart"),
            cart_path: "/gp/cart/view.html".to_owned(),
            proceed_to_checkout: Locator::id("sc-buy-box-ptc-button"),
            place_order: Locator::id("placeYourOrder"),

            buy_now: Locator::id("buy-now-button"),
            checkout_frame: "turbo-checkout-iframe".to_owned(),
            frame_place_order: Locator::id("turbo-checkout-place-order-button"),
        }
    }
}
