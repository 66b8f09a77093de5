//! Paginated scrape of the retailer's lending-library catalog.
pub mod client;
pub mod parse;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::RawListing;

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Raw HTML of page `page` (1-based), or `None` when the page could not be
    /// served; the page loop treats that as the end of the catalog.
    async fn fetch_page(&self, page: u32) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeResult {
    pub pages: u32,
    pub listings: Vec<RawListing>,
}

/// Walk pages `1..max_pages` until one is missing or holds no product cards.
pub async fn scrape_all_pages(source: &dyn CatalogSource, max_pages: u32) -> ScrapeResult {
    let mut result = ScrapeResult::default();
    for page in 1..max_pages {
        info!(page, "fetching catalog page");
        let Some(html) = source.fetch_page(page).await else {
            break;
        };
        let listings = match parse::parse_listings(&html) {
            Ok(listings) => listings,
            Err(err) => {
                warn!(page, error = %err, "catalog page could not be parsed; stopping");
                break;
            }
        };
        if listings.is_empty() {
            info!(page, "no more games found; stopping");
            break;
        }
        result.pages += 1;
        result.listings.extend(listings);
    }
    if result.pages + 1 >= max_pages {
        warn!(max_pages, "page cap reached; catalog may be truncated");
    }
    result
}
