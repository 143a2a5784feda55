//! Product discovery: search results page to parsed, cached products.

pub mod canonical;

use std::time::Duration;

use reqwest::Url;
use scraper::Html;
use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::error::{BatchError, Error, Result};
use crate::fetcher::PageLoader;
use crate::models::{Money, Product, SearchResult};
use crate::parser::{ProductParser, detect_bot_challenge};
use crate::traits::PageSource;

pub use canonical::canonicalize;

/// Results of one search. A non-empty `errors` alongside results is a
/// partial success, not a failure.
#[derive(Debug, Default)]
pub struct SearchReport {
    pub results: Vec<SearchResult>,
    pub errors: BatchError,
}

impl SearchReport {
    /// The combined per-URL error, if any URL failed.
    pub fn error(&self) -> Option<&BatchError> {
        (!self.errors.is_empty()).then_some(&self.errors)
    }
}

/// Base URL for `domain`. A bare host gets `https://`; a value that already
/// carries a scheme is used as is.
pub fn entrypoint(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.contains("://") {
        domain.to_owned()
    } else {
        format!("https://{domain}")
    }
}

pub fn build_search_url(entrypoint: &str, name: &str, min_price: u64, max_price: u64) -> String {
    format!(
        "{entrypoint}/s?k={}&low-price={min_price}&high-price={max_price}",
        urlencoding::encode(name)
    )
}

/// Searches one storefront and resolves every candidate product, through a
/// cache owned by this engine. Not meant for concurrent use.
pub struct SearchEngine {
    loader: PageLoader,
    parser: ProductParser,
    cache: ResultCache,
    cache_ttl: Duration,
}

impl SearchEngine {
    pub fn new(loader: PageLoader, parser: ProductParser, cache_ttl: Duration) -> Self {
        Self {
            loader,
            parser,
            cache: ResultCache::new(),
            cache_ttl,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Runs a search for `name` priced between `min_price` and `max_price`.
    ///
    /// # Errors
    ///
    /// Only failures of the results page itself are errors
    /// ([`Error::FetchFailed`], [`Error::Captcha`], [`Error::NoResultsFound`]).
    /// Per-product failures are collected in [`SearchReport::errors`].
    pub async fn search(
        &mut self,
        domain: &str,
        name: &str,
        min_price: u64,
        max_price: u64,
    ) -> Result<SearchReport> {
        self.cache.sweep();

        let entrypoint = entrypoint(domain);
        let search_url = build_search_url(&entrypoint, name, min_price, max_price);
        info!("Searching {:?} on {} ({}-{})", name, entrypoint, min_price, max_price);

        let page = self.loader.fetch_raw(&search_url).await?;
        if !page.is_ok() {
            return Err(Error::FetchFailed {
                url: search_url,
                status: page.status,
                reason: "main search query failed".to_owned(),
            });
        }

        let base = Url::parse(&entrypoint).map_err(|e| Error::InvalidUrl {
            url: entrypoint.clone(),
            reason: e.to_string(),
        })?;
        let paths = {
            let document = Html::parse_document(&page.body);
            let paths: Vec<String> = self
                .parser
                .result_links(&document)
                .iter()
                .filter_map(|href| base.join(href).ok())
                .filter(|url| same_storefront(&base, url))
                .map(|url| url.path().to_owned())
                .collect();
            canonicalize(paths)
        };

        if paths.is_empty() {
            if detect_bot_challenge(&page.body) {
                return Err(Error::Captcha { url: search_url });
            }
            return Err(Error::NoResultsFound { url: search_url });
        }

        let urls: Vec<String> = paths.iter().map(|path| format!("{entrypoint}{path}")).collect();
        let (hits, misses): (Vec<_>, Vec<_>) = urls
            .into_iter()
            .partition(|url| self.cache.lookup(url).is_some());

        info!(
            "Found {} candidate products ({} cached, {} to fetch)",
            hits.len() + misses.len(),
            hits.len(),
            misses.len()
        );

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .filter_map(|url| {
                let product = self.cache.lookup(&url)?.clone();
                Some(SearchResult { product, url })
            })
            .collect();

        let mut errors = BatchError::default();
        let mut fresh = Vec::with_capacity(misses.len());
        for url in misses {
            match self.resolve(&url).await {
                Ok(product) => fresh.push(SearchResult { product, url }),
                Err(e) => {
                    warn!("Failed to resolve {}: {}", url, e);
                    errors.push(url, e);
                }
            }
        }

        self.cache
            .store(fresh.iter().map(|r| r.product.clone()), self.cache_ttl);
        results.extend(fresh);

        info!("Search returned {} results with {} failures", results.len(), errors.len());
        Ok(SearchReport { results, errors })
    }

    /// Releases the fallback browser, if a bot challenge ever opened one.
    pub async fn close(&mut self) -> Result<()> {
        self.loader.close().await
    }

    async fn resolve(&mut self, url: &str) -> Result<Product> {
        let html = self.loader.load(url).await?;
        self.parser.parse_product(&html, url, &mut self.loader).await
    }
}

/// True when `url` points at the same host and port as `base`. Result links
/// to other sites are not products of this storefront.
fn same_storefront(base: &Url, url: &Url) -> bool {
    url.host_str() == base.host_str() && url.port_or_known_default() == base.port_or_known_default()
}

/// Keeps results whose product name contains every whitespace-separated term
/// of `name`, ignoring case.
pub fn filter(name: &str, results: Vec<SearchResult>) -> Vec<SearchResult> {
    let terms: Vec<String> = name.split_whitespace().map(str::to_lowercase).collect();
    results
        .into_iter()
        .filter(|result| {
            let product_name = result.product.name.to_lowercase();
            terms.iter().all(|term| product_name.contains(term.as_str()))
        })
        .collect()
}

/// Stable ascending sort by price.
pub fn sort_by_price(results: &mut [SearchResult]) {
    results.sort_by_key(|result| result.product.price);
}

/// The cheapest result matching `name` priced at most `max_price`.
pub fn cheapest_within(name: &str, max_price: Money, results: &[SearchResult]) -> Option<SearchResult> {
    let mut candidates = filter(name, results.to_vec());
    candidates.retain(|result| result.product.price <= max_price);
    sort_by_price(&mut candidates);
    candidates.into_iter().next()
}
