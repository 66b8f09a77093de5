//! Decide which items need work from the enrichment service this run.
//!
//! Identifiers are looked up once per name and retried while unresolved;
//! metadata is fetched once per identifier and never refreshed. Items that
//! have left the catalog are not enriched.
use std::collections::{HashMap, HashSet};

use crate::models::{ExternalId, GameMetadata, Item, Status, Unresolved};

#[derive(Debug, Clone, Copy)]
pub struct SelectionPolicy {
    /// Retry never-attempted and transport-failed lookups of older items.
    pub retry_unresolved: bool,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            retry_unresolved: true,
        }
    }
}

/// Names whose identifier should be looked up now.
///
/// `Unknown` (no match) identifiers are always retried; the policy only
/// decides whether never-attempted or transport-failed lookups on older
/// items are retried.
pub fn needs_identifier(items: &[Item], policy: SelectionPolicy) -> Vec<String> {
    items
        .iter()
        .filter(|i| i.status != Status::Removed)
        .filter(|i| match &i.external_id {
            ExternalId::Resolved(_) => false,
            ExternalId::Unresolved(Unresolved::NoMatch) => true,
            ExternalId::Unresolved(_) => i.status == Status::New || policy.retry_unresolved,
        })
        .map(|i| i.name.clone())
        .collect()
}

/// Metadata already on hand, keyed by identifier.
pub fn metadata_cache(items: &[Item]) -> HashMap<String, GameMetadata> {
    let mut cache = HashMap::new();
    for item in items {
        if let (Some(id), Some(meta)) = (item.external_id.resolved(), &item.metadata) {
            cache
                .entry(id.to_string())
                .or_insert_with(|| meta.clone());
        }
    }
    cache
}

/// Distinct identifiers with no stored metadata, in dataset order.
pub fn needs_metadata(items: &[Item], cache: &HashMap<String, GameMetadata>) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    items
        .iter()
        .filter(|i| i.status != Status::Removed && i.metadata.is_none())
        .filter_map(|i| i.external_id.resolved())
        .filter(|id| !cache.contains_key(*id) && seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Attach cached metadata to every resolved item that has none yet.
/// Returns how many items were filled.
pub fn apply_metadata(items: &mut [Item], cache: &HashMap<String, GameMetadata>) -> usize {
    let mut filled = 0;
    for item in items.iter_mut().filter(|i| i.metadata.is_none()) {
        if let Some(meta) = item.external_id.resolved().and_then(|id| cache.get(id)) {
            item.metadata = Some(meta.clone());
            filled += 1;
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Availability;
    use chrono::NaiveDate;

    fn item(name: &str, status: Status, id: ExternalId) -> Item {
        let now = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .unwrap();
        let mut item = Item::first_seen(name, Availability::Available, now);
        item.status = status;
        item.external_id = id;
        item
    }

    fn meta(title: &str) -> GameMetadata {
        GameMetadata {
            title: title.into(),
            year: Some(2017),
            best_with: "Best with 2 players".into(),
            recommended_with: "Recommended with 2–4 players".into(),
            avg_rating: Some(7.8),
            no_ratings: Some(90_000),
            rank: None,
        }
    }

    #[test]
    fn identifier_selection_follows_policy() {
        let items = vec![
            item("Azul", Status::New, ExternalId::default()),
            item(
                "Catan",
                Status::NoChange,
                ExternalId::Unresolved(Unresolved::NoMatch),
            ),
            item("Dune", Status::StateChange, ExternalId::Resolved("1".into())),
            item(
                "Gone",
                Status::Removed,
                ExternalId::Unresolved(Unresolved::NoMatch),
            ),
            item(
                "Timeout",
                Status::NoChange,
                ExternalId::Unresolved(Unresolved::NotAttempted),
            ),
        ];

        let retry = needs_identifier(&items, SelectionPolicy::default());
        assert_eq!(
            retry,
            vec!["Azul".to_string(), "Catan".to_string(), "Timeout".to_string()]
        );

        // No-match items are looked up again whatever the policy says.
        let new_only = needs_identifier(
            &items,
            SelectionPolicy {
                retry_unresolved: false,
            },
        );
        assert_eq!(new_only, vec!["Azul".to_string(), "Catan".to_string()]);
    }

    #[test]
    fn metadata_is_fetched_once_per_identifier() {
        let mut enriched = item("Azul", Status::NoChange, ExternalId::Resolved("230802".into()));
        enriched.metadata = Some(meta("Azul"));
        let items = vec![
            enriched,
            // Same identifier under another catalog name: served from cache.
            item("Azul (Sv)", Status::New, ExternalId::Resolved("230802".into())),
            item("Wingspan", Status::New, ExternalId::Resolved("266192".into())),
            item("Wingspan (Sv)", Status::New, ExternalId::Resolved("266192".into())),
            item("Mystery", Status::New, ExternalId::default()),
        ];

        let cache = metadata_cache(&items);
        assert_eq!(needs_metadata(&items, &cache), vec!["266192".to_string()]);
    }

    #[test]
    fn apply_fills_only_missing_metadata() {
        let mut stored = item("Azul", Status::NoChange, ExternalId::Resolved("1".into()));
        stored.metadata = Some(meta("Azul (old)"));
        let mut items = vec![
            stored,
            item("Azul (Sv)", Status::New, ExternalId::Resolved("1".into())),
        ];
        let mut cache = HashMap::new();
        cache.insert("1".to_string(), meta("Azul (new)"));

        assert_eq!(apply_metadata(&mut items, &cache), 1);
        assert_eq!(items[0].metadata.as_ref().unwrap().title, "Azul (old)");
        assert_eq!(items[1].metadata.as_ref().unwrap().title, "Azul (new)");
    }
}
