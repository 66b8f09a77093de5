//! Read-side views over the dataset for operators.
use std::cmp::Ordering;

use chrono::{Duration, NaiveDateTime};
use indexmap::IndexMap;
use serde::Serialize;

use crate::models::{Availability, Item, Status};

/// Items that changed state in the last run or whose state is younger than
/// `days`, newest first, ties broken by rating (highest first).
pub fn recently_updated(items: &[Item], now: NaiveDateTime, days: i64) -> Vec<&Item> {
    let cutoff = now - Duration::days(days);
    let mut recent: Vec<&Item> = items
        .iter()
        .filter(|i| i.status == Status::StateChange || i.state_since > cutoff)
        .collect();
    recent.sort_by(|a, b| {
        b.state_since.cmp(&a.state_since).then_with(|| {
            let ra = a.metadata.as_ref().and_then(|m| m.avg_rating);
            let rb = b.metadata.as_ref().and_then(|m| m.avg_rating);
            rb.partial_cmp(&ra).unwrap_or(Ordering::Equal)
        })
    });
    recent
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    pub total: usize,
    pub by_status: IndexMap<String, usize>,
    pub by_availability: IndexMap<String, usize>,
    pub played: usize,
    pub wishlisted: usize,
    pub enriched: usize,
    pub unresolved: usize,
}

pub fn stats(items: &[Item]) -> DatasetStats {
    let mut out = DatasetStats {
        total: items.len(),
        ..DatasetStats::default()
    };
    for status in Status::ALL {
        out.by_status.insert(status.as_str().to_string(), 0);
    }
    for state in [
        Availability::Available,
        Availability::Unavailable,
        Availability::Unknown,
    ] {
        out.by_availability.insert(state.as_str().to_string(), 0);
    }
    for item in items {
        *out.by_status.entry(item.status.as_str().to_string()).or_default() += 1;
        if let Some(state) = item.state_current {
            *out
                .by_availability
                .entry(state.as_str().to_string())
                .or_default() += 1;
        }
        out.played += usize::from(item.played);
        out.wishlisted += usize::from(item.wishlist);
        out.enriched += usize::from(item.metadata.is_some());
        out.unresolved += usize::from(!item.external_id.is_resolved());
    }
    out
}
