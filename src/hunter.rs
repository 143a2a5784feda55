use tracing::info;

use crate::error::{BatchError, Error, Result};
use crate::models::{Money, Purchase, SearchResult};
use crate::purchase::{PurchaseOrchestrator, PurchaseRequest};
use crate::search::{self, SearchEngine, build_search_url, entrypoint};

/// What to look for and how to buy it.
#[derive(Debug, Clone)]
pub struct HuntRequest {
    pub domain: String,
    pub name: String,
    pub min_price: u64,
    pub max_price: u64,
    /// Template for the purchase; its `link` and `max_price` are filled in.
    pub purchase: PurchaseRequest,
}

#[derive(Debug)]
pub struct HuntReport {
    pub pick: SearchResult,
    pub purchase: Purchase,
    /// Products the search could not resolve.
    pub search_errors: BatchError,
}

/// Searches a storefront and buys the cheapest matching product.
pub struct Hunter {
    engine: SearchEngine,
    orchestrator: PurchaseOrchestrator,
}

impl Hunter {
    pub fn new(engine: SearchEngine, orchestrator: PurchaseOrchestrator) -> Self {
        Self {
            engine,
            orchestrator,
        }
    }

    /// # Errors
    ///
    /// Search page errors, [`Error::NoResultsFound`] when nothing matches the
    /// name within budget, and any purchase error.
    pub async fn hunt(&mut self, request: &HuntRequest) -> Result<HuntReport> {
        let report = self
            .engine
            .search(&request.domain, &request.name, request.min_price, request.max_price)
            .await?;

        let max_price = Money::whole(request.max_price);
        let Some(pick) = search::cheapest_within(&request.name, max_price, &report.results) else {
            let url = build_search_url(
                &entrypoint(&request.domain),
                &request.name,
                request.min_price,
                request.max_price,
            );
            info!("No {:?} within {} among {} results", request.name, max_price, report.results.len());
            return Err(Error::NoResultsFound { url });
        };

        info!("Cheapest match: {} - {} ({})", pick.product.name, pick.product.price, pick.url);

        let purchase_request = PurchaseRequest {
            link: pick.url.clone(),
            max_price,
            ..request.purchase.clone()
        };
        let purchase = self.orchestrator.purchase(&purchase_request).await?;

        Ok(HuntReport {
            pick,
            purchase,
            search_errors: report.errors,
        })
    }

    pub async fn close(&mut self) -> Result<()> {
        let searched = self.engine.close().await;
        let purchased = self.orchestrator.close().await;
        searched.and(purchased)
    }
}
