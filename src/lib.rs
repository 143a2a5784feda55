//! Product discovery and automated checkout for storefront web pages.

pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod hunter;
pub mod models;
pub mod normalize;
pub mod parser;
pub mod purchase;
pub mod retry;
pub mod search;
pub mod traits;

pub use config::Config;
pub use error::{BatchError, Error, Result, UrlFailure};
pub use models::{Availability, Money, Product, Purchase, SearchResult};
