//! Core record types shared by the normalizer, reconciliation engine, enrichment
//! pipeline and the persistence layer.
use std::fmt;

use chrono::NaiveDateTime;

/// Text form of `state_since` on disk (local time, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Sentinel written to the `id` column when a lookup found nothing.
pub const UNKNOWN_ID: &str = "Unknown";

/// Availability of a title at one scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Availability {
    Available,
    Unavailable,
    Unknown,
}

impl Availability {
    pub fn as_str(self) -> &'static str {
        match self {
            Availability::Available => "Available",
            Availability::Unavailable => "Unavailable",
            Availability::Unknown => "Unknown",
        }
    }

    /// Parse the canonical vocabulary written by [`Availability::as_str`].
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Available" => Some(Availability::Available),
            "Unavailable" => Some(Availability::Unavailable),
            "Unknown" => Some(Availability::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of an item for the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    New,
    StateChange,
    NoChange,
    Removed,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::New,
        Status::StateChange,
        Status::NoChange,
        Status::Removed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::New => "New Game",
            Status::StateChange => "State Change",
            Status::NoChange => "No Change",
            Status::Removed => "Removed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "New Game" => Some(Status::New),
            "State Change" => Some(Status::StateChange),
            "No Change" => Some(Status::NoChange),
            "Removed" => Some(Status::Removed),
            _ => None,
        }
    }

    /// New and changed items form the actionable delta of a run.
    pub fn is_change(self) -> bool {
        matches!(self, Status::New | Status::StateChange)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an item has no identifier in the enrichment service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unresolved {
    NotAttempted,
    NoMatch,
    TransportError,
}

/// Identifier in the enrichment service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExternalId {
    Resolved(String),
    Unresolved(Unresolved),
}

impl ExternalId {
    pub fn resolved(&self) -> Option<&str> {
        match self {
            ExternalId::Resolved(id) => Some(id.as_str()),
            ExternalId::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ExternalId::Resolved(_))
    }

    /// Column encoding: a real id, `Unknown` for no match, empty otherwise.
    pub fn to_column(&self) -> &str {
        match self {
            ExternalId::Resolved(id) => id,
            ExternalId::Unresolved(Unresolved::NoMatch) => UNKNOWN_ID,
            ExternalId::Unresolved(_) => "",
        }
    }

    /// Inverse of [`ExternalId::to_column`]. An empty cell cannot tell a
    /// transport failure from a lookup that never ran; both are retried, so
    /// it reads back as `NotAttempted`.
    pub fn from_column(raw: &str) -> Self {
        match raw.trim() {
            "" => ExternalId::Unresolved(Unresolved::NotAttempted),
            UNKNOWN_ID => ExternalId::Unresolved(Unresolved::NoMatch),
            id => ExternalId::Resolved(id.to_string()),
        }
    }
}

impl Default for ExternalId {
    fn default() -> Self {
        ExternalId::Unresolved(Unresolved::NotAttempted)
    }
}

/// Position in the enrichment service's overall ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rank {
    Ranked(u32),
    NotRanked,
}

impl Rank {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(n) = raw.parse::<u32>() {
            return Some(Rank::Ranked(n));
        }
        // Float-rendered ranks (`512.0`) from older files.
        match raw.parse::<f64>() {
            Ok(f) if f >= 1.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) => {
                Some(Rank::Ranked(f as u32))
            }
            _ => Some(Rank::NotRanked),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rank::Ranked(n) => write!(f, "{n}"),
            Rank::NotRanked => f.write_str("Not Ranked"),
        }
    }
}

/// Enrichment payload for one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct GameMetadata {
    pub title: String,
    pub year: Option<i32>,
    pub best_with: String,
    pub recommended_with: String,
    pub avg_rating: Option<f64>,
    pub no_ratings: Option<u32>,
    pub rank: Option<Rank>,
}

/// One tracked catalog entry, keyed by `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub name: String,
    /// `None` once the item has dropped out of the catalog.
    pub state_current: Option<Availability>,
    /// `None` on an item's first appearance.
    pub state_previous: Option<Availability>,
    pub state_since: NaiveDateTime,
    pub status: Status,
    pub external_id: ExternalId,
    pub metadata: Option<GameMetadata>,
    pub played: bool,
    pub wishlist: bool,
}

impl Item {
    /// A first sighting: no history, no enrichment, flags cleared.
    pub fn first_seen(name: impl Into<String>, state: Availability, now: NaiveDateTime) -> Self {
        Self {
            name: name.into(),
            state_current: Some(state),
            state_previous: None,
            state_since: now,
            status: Status::New,
            external_id: ExternalId::default(),
            metadata: None,
            played: false,
            wishlist: false,
        }
    }
}

/// One canonical `(name, availability)` pair out of the snapshot normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub name: String,
    pub state: Availability,
}

impl SnapshotEntry {
    pub fn new(name: impl Into<String>, state: Availability) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }
}

/// One unprocessed `(name, availability text)` pair from a catalog page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    pub name: String,
    pub state: String,
}

impl RawListing {
    pub fn new(name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_id_column_encoding() {
        assert_eq!(ExternalId::Resolved("13".into()).to_column(), "13");
        assert_eq!(
            ExternalId::Unresolved(Unresolved::NoMatch).to_column(),
            "Unknown"
        );
        assert_eq!(
            ExternalId::Unresolved(Unresolved::TransportError).to_column(),
            ""
        );
        assert_eq!(
            ExternalId::from_column("Unknown"),
            ExternalId::Unresolved(Unresolved::NoMatch)
        );
        assert_eq!(
            ExternalId::from_column(" "),
            ExternalId::Unresolved(Unresolved::NotAttempted)
        );
        assert_eq!(
            ExternalId::from_column("822"),
            ExternalId::Resolved("822".into())
        );
    }

    #[test]
    fn rank_parses_numbers_and_labels() {
        assert_eq!(Rank::parse("412"), Some(Rank::Ranked(412)));
        assert_eq!(Rank::parse("412.0"), Some(Rank::Ranked(412)));
        assert_eq!(Rank::parse("Not Ranked"), Some(Rank::NotRanked));
        assert_eq!(Rank::parse(""), None);
        assert_eq!(Rank::NotRanked.to_string(), "Not Ranked");
    }

    #[test]
    fn status_text_matches_dataset_vocabulary() {
        for status in Status::ALL {
            assert_eq!(Status::parse(status.as_str()), Some(status));
        }
        assert!(Status::New.is_change());
        assert!(Status::StateChange.is_change());
        assert!(!Status::Removed.is_change());
    }
}
