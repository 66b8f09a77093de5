//! Identifier lookup and metadata enrichment against the board-game database.
pub mod bgg;
pub mod retry;
pub mod selector;
pub mod xml;

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::{ExternalId, GameMetadata, Item, Unresolved};
use selector::SelectionPolicy;

/// The enrichment service as seen by the pipeline. Failures never surface as
/// errors: a lookup that cannot complete yields an unresolved identifier, a
/// details fetch that cannot complete yields `None`.
#[async_trait]
pub trait EnrichmentService: Send + Sync {
    /// Resolve a catalog display name to an identifier.
    async fn search(&self, name: &str) -> ExternalId;
    /// Fetch the metadata record for an identifier.
    async fn fetch_details(&self, id: &str) -> Option<GameMetadata>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentifierStats {
    pub requested: usize,
    pub resolved: usize,
    pub no_match: usize,
    pub transport_failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataStats {
    pub requested: usize,
    pub fetched: usize,
    pub failed: usize,
    /// Items that received metadata this run, from a fresh fetch or the cache.
    pub attached: usize,
}

/// Look up identifiers for every selected item, one request at a time.
pub async fn resolve_identifiers(
    items: &mut [Item],
    service: &dyn EnrichmentService,
    policy: SelectionPolicy,
) -> IdentifierStats {
    let names = selector::needs_identifier(items, policy);
    let mut stats = IdentifierStats {
        requested: names.len(),
        ..IdentifierStats::default()
    };
    if names.is_empty() {
        info!("no identifiers to look up");
        return stats;
    }
    info!(count = names.len(), "looking up identifiers");

    let index: HashMap<String, usize> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.name.clone(), i))
        .collect();

    for name in names {
        let id = service.search(&name).await;
        match &id {
            ExternalId::Resolved(_) => stats.resolved += 1,
            ExternalId::Unresolved(Unresolved::NoMatch) => stats.no_match += 1,
            ExternalId::Unresolved(_) => stats.transport_failed += 1,
        }
        if let Some(&i) = index.get(&name) {
            items[i].external_id = id;
        }
    }
    if stats.transport_failed > 0 {
        warn!(
            failed = stats.transport_failed,
            "some identifier lookups failed; they will be retried next run"
        );
    }
    stats
}

/// Fetch metadata for identifiers never enriched before, then attach cached
/// metadata to every item that lacks it.
pub async fn fetch_metadata(items: &mut [Item], service: &dyn EnrichmentService) -> MetadataStats {
    let mut cache = selector::metadata_cache(items);
    let ids = selector::needs_metadata(items, &cache);
    let mut stats = MetadataStats {
        requested: ids.len(),
        ..MetadataStats::default()
    };
    if !ids.is_empty() {
        info!(count = ids.len(), "fetching details");
    }

    for id in ids {
        match service.fetch_details(&id).await {
            Some(meta) => {
                stats.fetched += 1;
                cache.insert(id, meta);
            }
            None => stats.failed += 1,
        }
    }
    stats.attached = selector::apply_metadata(items, &cache);
    stats
}
