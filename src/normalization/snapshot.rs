use indexmap::IndexMap;
use tracing::debug;

use crate::models::{Availability, RawListing, SnapshotEntry};

/// Name the catalog parser assigns to a card it could not decode.
pub const UNPARSED_NAME: &str = "Unknown";

/// Catalog wording for "on the shelf".
const IN_STOCK: &str = "Finns i lager";
/// Catalog wording for "order item", i.e. currently lent out.
const ON_ORDER: &str = "Beställningsvara";

/// Map a scraped availability string onto the fixed vocabulary.
///
/// Both the catalog's locale wording and the canonical English words are
/// accepted; everything else is `Unknown`.
pub fn map_availability(raw: &str) -> Availability {
    let cleaned: String = raw.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    match cleaned.trim() {
        IN_STOCK | "Available" => Availability::Available,
        ON_ORDER | "Unavailable" => Availability::Unavailable,
        _ => Availability::Unknown,
    }
}

/// Make a title safe for a comma-delimited file.
pub fn sanitize_name(raw: &str) -> String {
    raw.trim().replace(',', ";")
}

/// Turn one scrape pass into canonical, duplicate-free snapshot entries.
///
/// Unparseable cards are dropped. A title seen twice keeps the state of its
/// later occurrence; output order follows first appearance.
pub fn normalize(raw: &[RawListing]) -> Vec<SnapshotEntry> {
    let mut by_name: IndexMap<String, Availability> = IndexMap::with_capacity(raw.len());
    let mut dropped = 0usize;
    for listing in raw {
        let name = sanitize_name(&listing.name);
        if name.is_empty() || name == UNPARSED_NAME {
            dropped += 1;
            continue;
        }
        by_name.insert(name, map_availability(&listing.state));
    }
    if dropped > 0 {
        debug!(dropped, "discarded unparseable catalog entries");
    }
    by_name
        .into_iter()
        .map(|(name, state)| SnapshotEntry { name, state })
        .collect()
}
