//! Data models for products, search results and purchase outcomes

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A non-negative amount of money in the listing's currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

#[derive(Debug, Error)]
#[error("negative amount of money: {0}")]
pub struct NegativeAmount(pub Decimal);

impl TryFrom<Decimal> for Money {
    type Error = NegativeAmount;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount).ok_or(NegativeAmount(amount))
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Money {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Returns `None` for negative amounts.
    pub fn new(amount: Decimal) -> Option<Self> {
        (!amount.is_sign_negative() || amount.is_zero()).then_some(Self(amount))
    }

    pub fn whole(units: u64) -> Self {
        Self(Decimal::from(units))
    }

    pub fn amount(self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// A product listing parsed from a product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub url: String,
    pub name: String,
    pub price: Money,
}

/// A product together with the absolute URL it was fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub product: Product,
    pub url: String,
}

impl From<Product> for SearchResult {
    fn from(product: Product) -> Self {
        let url = product.url.clone();
        Self { product, url }
    }
}

/// Outcome of one purchase attempt. `bought == false` is a normal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Purchase {
    pub bought: bool,
    pub reason: String,
    pub stock: String,
    pub price: Option<Money>,
    pub delivery: String,
    pub dry_run: bool,
}

impl Purchase {
    pub const NO_STOCK: &'static str = "No stock available.";
    pub const PRICE_TOO_HIGH: &'static str = "Price was higher than maximum.";
    pub const CONDITIONS_MET: &'static str = "All conditions met.";
}

/// Page state classified from the scraped availability text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    InStock,
    OutOfStock,
    /// Only sold through the offer listing of other sellers.
    MultiSeller,
    Unknown,
}

const OUT_OF_STOCK_PHRASES: &[&str] = &["unavailable", "niet op voorraad"];
const MULTI_SELLER_PHRASES: &[&str] = &[
    "Available from these sellers.",
    "Beschikbaar bij deze verkopers.",
];
const IN_STOCK_PHRASES: &[&str] = &["In Stock", "In stock", "Op voorraad"];

impl Availability {
    /// Matching is case-sensitive and substring based. Out-of-stock phrases
    /// win over everything else so "niet op voorraad" never reads as in stock.
    pub fn classify(text: &str) -> Self {
        let contains_any = |phrases: &[&str]| phrases.iter().any(|p| text.contains(p));

        if contains_any(OUT_OF_STOCK_PHRASES) {
            Self::OutOfStock
        } else if contains_any(MULTI_SELLER_PHRASES) {
            Self::MultiSeller
        } else if contains_any(IN_STOCK_PHRASES) {
            Self::InStock
        } else {
            Self::Unknown
        }
    }
}
