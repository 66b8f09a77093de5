//! Merge a fresh snapshot into the persisted dataset.
//!
//! Full outer join on `name`:
//!   * in both    -> `NoChange` or `StateChange` (timestamp advances on change)
//!   * fresh only -> `New`, first-seen timestamp
//!   * prior only -> `Removed`, timestamp kept, every other field kept
//!
//! Enrichment fields and the user flags travel with the prior record untouched.
use std::collections::{BTreeMap, HashSet};

use anyhow::{bail, Result};
use chrono::NaiveDateTime;

use crate::models::{Item, SnapshotEntry, Status};

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Every item, sorted by name.
    pub merged: Vec<Item>,
    /// The `New`/`StateChange` subset of `merged`.
    pub changed: Vec<Item>,
}

impl Reconciliation {
    pub fn count(&self, status: Status) -> usize {
        self.merged.iter().filter(|i| i.status == status).count()
    }
}

pub fn reconcile(
    prior: Vec<Item>,
    fresh: &[SnapshotEntry],
    now: NaiveDateTime,
) -> Result<Reconciliation> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(fresh.len());
    for entry in fresh {
        if !seen.insert(entry.name.as_str()) {
            bail!(
                "snapshot contains duplicate name {:?}; normalization must dedupe before reconcile",
                entry.name
            );
        }
    }

    let mut by_name: BTreeMap<String, Item> = BTreeMap::new();
    for item in prior {
        if by_name.contains_key(&item.name) {
            bail!("persisted dataset contains duplicate name {:?}", item.name);
        }
        by_name.insert(item.name.clone(), item);
    }

    let mut merged: Vec<Item> = Vec::with_capacity(by_name.len() + fresh.len());
    for entry in fresh {
        let item = match by_name.remove(&entry.name) {
            Some(mut known) => {
                let previous = known.state_current;
                // A returning item keeps its last known availability as previous.
                if previous.is_some() {
                    known.state_previous = previous;
                }
                known.state_current = Some(entry.state);
                if previous == Some(entry.state) {
                    known.status = Status::NoChange;
                } else {
                    known.status = Status::StateChange;
                    known.state_since = now;
                }
                known
            }
            None => Item::first_seen(entry.name.clone(), entry.state, now),
        };
        merged.push(item);
    }

    // Whatever is left was not in this scrape.
    for (_, mut gone) in by_name {
        // Already removed: keep the last known availability.
        if gone.state_current.is_some() {
            gone.state_previous = gone.state_current;
        }
        gone.state_current = None;
        gone.status = Status::Removed;
        merged.push(gone);
    }

    merged.sort_by(|a, b| a.name.cmp(&b.name));
    let changed = merged
        .iter()
        .filter(|i| i.status.is_change())
        .cloned()
        .collect();
    Ok(Reconciliation { merged, changed })
}
