use anyhow::{anyhow, Result};
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::debug;

use crate::models::{Availability, RawListing};
use crate::normalization::snapshot::UNPARSED_NAME;

/// Prefix the shop puts in front of every lending-library product name.
const LIBRARY_PREFIX: &str = "-Lånebiblioteket- ";

#[derive(Debug, Deserialize)]
struct ProductObject {
    name: Option<String>,
}

fn product_name(raw_json: &str) -> String {
    match serde_json::from_str::<ProductObject>(raw_json) {
        Ok(ProductObject { name: Some(name) }) => {
            name.replace(LIBRARY_PREFIX, "").trim().to_string()
        }
        Ok(ProductObject { name: None }) => UNPARSED_NAME.to_string(),
        Err(err) => {
            debug!(error = %err, "product card JSON unreadable");
            UNPARSED_NAME.to_string()
        }
    }
}

/// Extract `(name, availability text)` pairs from one catalog page.
///
/// Product cards are `div.column` elements carrying a `data-product-object`
/// JSON attribute; availability is the text of the card's `div.stock`.
pub fn parse_listings(html: &str) -> Result<Vec<RawListing>> {
    let document = Html::parse_document(html);
    let card_selector =
        Selector::parse("div.column").map_err(|e| anyhow!("card selector: {e}"))?;
    let stock_selector =
        Selector::parse("div.stock").map_err(|e| anyhow!("stock selector: {e}"))?;

    let mut listings = Vec::new();
    for card in document.select(&card_selector) {
        let Some(product) = card.value().attr("data-product-object") else {
            continue;
        };
        let name = product_name(product);
        let state = card
            .select(&stock_selector)
            .next()
            .map(|stock| {
                stock
                    .text()
                    .collect::<String>()
                    .replace('\n', "")
                    .trim()
                    .to_string()
            })
            .unwrap_or_else(|| Availability::Unknown.as_str().to_string());
        listings.push(RawListing { name, state });
    }
    Ok(listings)
}
