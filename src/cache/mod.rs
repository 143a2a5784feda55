//! Time-bounded product cache keyed by canonical URL.
//!
//! Entries are evicted by [`ResultCache::sweep`] only, which the search engine
//! calls once per search. There is no background expiry and no locking.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::Product;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub product: Product,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<String, CacheEntry>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, url: &str) -> Option<&Product> {
        self.entries.get(url).map(|entry| &entry.product)
    }

    /// Inserts or overwrites one entry per product, expiring `ttl` from now.
    pub fn store(&mut self, products: impl IntoIterator<Item = Product>, ttl: Duration) {
        self.store_at(products, ttl, Utc::now());
    }

    pub fn store_at(
        &mut self,
        products: impl IntoIterator<Item = Product>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        for product in products {
            self.entries.insert(
                product.url.clone(),
                CacheEntry {
                    product,
                    expires_at,
                },
            );
        }
    }

    /// Drops every entry whose expiry has passed.
    pub fn sweep(&mut self) {
        self.sweep_at(Utc::now());
    }

    pub fn sweep_at(&mut self, now: DateTime<Utc>) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.expires_at);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!("Evicted {} expired cache entries", evicted);
        }
    }
}
