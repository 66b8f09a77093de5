//! Delimited-text persistence of the tracked dataset.
//!
//! Schema v2 is the 15 columns in [`COLUMNS`]. Files written before the user
//! flags existed (v1, the first 13 columns) are migrated on load with both
//! flags cleared. Any other shape is schema drift and fails the load.
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::{
    Availability, ExternalId, GameMetadata, Item, Rank, Status, TIMESTAMP_FORMAT,
};
use crate::util::env::parse_flag;

pub const COLUMNS: [&str; 15] = [
    "name",
    "state_previous",
    "state_current",
    "state_since",
    "status",
    "id",
    "title",
    "year",
    "best_with",
    "recommended_with",
    "avg_rating",
    "no_ratings",
    "bgg_rank",
    "played",
    "wishlist",
];

/// Columns added by schema v2.
const V2_ADDED: [&str; 2] = ["played", "wishlist"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V2,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DatasetRow {
    name: String,
    state_previous: String,
    state_current: String,
    state_since: String,
    status: String,
    id: String,
    title: String,
    year: String,
    best_with: String,
    recommended_with: String,
    avg_rating: String,
    no_ratings: String,
    bgg_rank: String,
    #[serde(default)]
    played: String,
    #[serde(default)]
    wishlist: String,
}

fn availability_column(state: Option<Availability>) -> String {
    state.map(|s| s.as_str().to_string()).unwrap_or_default()
}

fn parse_availability(raw: &str, column: &str) -> Result<Option<Availability>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Availability::parse(raw)
        .map(Some)
        .ok_or_else(|| anyhow!("invalid {column} value {raw:?}"))
}

fn opt_to_column<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

/// Integer cell; tolerates the float rendering (`2017.0`) older writers produced.
fn parse_whole<T: TryFrom<i64>>(raw: &str, column: &str) -> Result<Option<T>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let whole = match raw.parse::<i64>() {
        Ok(n) => n,
        Err(_) => {
            let f: f64 = raw
                .parse()
                .map_err(|_| anyhow!("invalid {column} value {raw:?}"))?;
            if !f.is_finite() || f.fract() != 0.0 {
                bail!("invalid {column} value {raw:?}");
            }
            f as i64
        }
    };
    T::try_from(whole)
        .map(Some)
        .map_err(|_| anyhow!("{column} value {raw:?} out of range"))
}

fn parse_rating(raw: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| anyhow!("invalid avg_rating value {raw:?}"))
}

/// `230802.0` names the same game as `230802`.
fn id_column(raw: &str) -> String {
    match parse_whole::<u64>(raw, "id") {
        Ok(Some(n)) => n.to_string(),
        _ => raw.trim().to_string(),
    }
}

/// Empty cells are `false` (v1 rows); anything unrecognised is an error.
fn parse_flag_column(raw: &str, column: &str) -> Result<bool> {
    if raw.trim().is_empty() {
        return Ok(false);
    }
    parse_flag(raw).ok_or_else(|| anyhow!("invalid {column} value {raw:?}"))
}

fn bool_column(flag: bool) -> String {
    let text = if flag { "True" } else { "False" };
    text.to_string()
}

impl DatasetRow {
    fn from_item(item: &Item) -> Self {
        let mut row = DatasetRow {
            name: item.name.clone(),
            state_previous: availability_column(item.state_previous),
            state_current: availability_column(item.state_current),
            state_since: item.state_since.format(TIMESTAMP_FORMAT).to_string(),
            status: item.status.as_str().to_string(),
            id: item.external_id.to_column().to_string(),
            played: bool_column(item.played),
            wishlist: bool_column(item.wishlist),
            ..DatasetRow::default()
        };
        if let Some(meta) = &item.metadata {
            row.title = meta.title.clone();
            row.year = opt_to_column(&meta.year);
            row.best_with = meta.best_with.clone();
            row.recommended_with = meta.recommended_with.clone();
            row.avg_rating = opt_to_column(&meta.avg_rating);
            row.no_ratings = opt_to_column(&meta.no_ratings);
            row.bgg_rank = opt_to_column(&meta.rank);
        }
        row
    }

    fn into_item(self) -> Result<Item> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            bail!("empty name");
        }
        let state_since = NaiveDateTime::parse_from_str(self.state_since.trim(), TIMESTAMP_FORMAT)
            .with_context(|| format!("invalid state_since {:?}", self.state_since))?;
        let status = Status::parse(&self.status)
            .ok_or_else(|| anyhow!("invalid status {:?}", self.status))?;
        let metadata = if self.title.trim().is_empty() {
            None
        } else {
            Some(GameMetadata {
                year: parse_whole(&self.year, "year")?,
                avg_rating: parse_rating(&self.avg_rating)?,
                no_ratings: parse_whole(&self.no_ratings, "no_ratings")?,
                rank: Rank::parse(&self.bgg_rank),
                title: self.title,
                best_with: self.best_with,
                recommended_with: self.recommended_with,
            })
        };
        Ok(Item {
            name,
            state_current: parse_availability(&self.state_current, "state_current")?,
            state_previous: parse_availability(&self.state_previous, "state_previous")?,
            state_since,
            status,
            external_id: ExternalId::from_column(&id_column(&self.id)),
            metadata,
            played: parse_flag_column(&self.played, "played")?,
            wishlist: parse_flag_column(&self.wishlist, "wishlist")?,
        })
    }
}

/// Work out the schema version from a header row.
pub fn detect_schema<'a, I>(headers: I) -> Result<SchemaVersion>
where
    I: IntoIterator<Item = &'a str>,
{
    let present: Vec<&str> = headers.into_iter().map(str::trim).collect();
    let missing: Vec<&str> = COLUMNS
        .iter()
        .copied()
        .filter(|c| !present.contains(c))
        .collect();
    if missing.is_empty() {
        return Ok(SchemaVersion::V2);
    }
    if missing.len() == V2_ADDED.len() && missing.iter().all(|c| V2_ADDED.contains(c)) {
        return Ok(SchemaVersion::V1);
    }
    bail!("dataset schema mismatch: missing columns {missing:?}")
}

/// Load the persisted dataset. A missing file means this is the first run.
pub fn load_dataset(path: &Path) -> Result<Vec<Item>> {
    if !path.exists() {
        info!(path = %path.display(), "no dataset yet; starting from an empty history");
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let headers = rdr.headers()?.clone();
    let version = detect_schema(headers.iter())
        .with_context(|| format!("load {}", path.display()))?;
    if version == SchemaVersion::V1 {
        warn!(path = %path.display(), "migrating v1 dataset: adding played/wishlist columns");
    }

    let mut items = Vec::new();
    for (idx, row) in rdr.deserialize::<DatasetRow>().enumerate() {
        // +2: one for the header, one for 1-based line numbers.
        let line = idx + 2;
        let row = row.with_context(|| format!("{} line {line}", path.display()))?;
        let item = row
            .into_item()
            .with_context(|| format!("{} line {line}", path.display()))?;
        items.push(item);
    }
    info!(path = %path.display(), rows = items.len(), "dataset loaded");
    Ok(items)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write items with a header row, replacing `path` atomically.
pub fn write_items(path: &Path, items: &[Item]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    let tmp = tmp_path(path);
    {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)
            .with_context(|| format!("open {}", tmp.display()))?;
        wtr.write_record(COLUMNS)?;
        for item in items {
            wtr.serialize(DatasetRow::from_item(item))?;
        }
        wtr.flush()?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Change the user flags of one item. Only `played`/`wishlist` are touched.
pub fn update_flags(
    path: &Path,
    name: &str,
    played: Option<bool>,
    wishlist: Option<bool>,
) -> Result<Item> {
    let mut items = load_dataset(path)?;
    let item = items
        .iter_mut()
        .find(|i| i.name == name)
        .ok_or_else(|| anyhow!("no item named {name:?} in {}", path.display()))?;
    if let Some(p) = played {
        item.played = p;
    }
    if let Some(w) = wishlist {
        item.wishlist = w;
    }
    let updated = item.clone();
    write_items(path, &items)?;
    info!(name, played = updated.played, wishlist = updated.wishlist, "flags updated");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Unresolved;
    use chrono::NaiveDate;

    fn since() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(10, 15, 30))
            .unwrap()
    }

    fn sample() -> Vec<Item> {
        let mut catan = Item::first_seen("Catan; Base Game", Availability::Available, since());
        catan.status = Status::StateChange;
        catan.state_previous = Some(Availability::Unavailable);
        catan.external_id = ExternalId::Resolved("13".into());
        catan.metadata = Some(GameMetadata {
            title: "CATAN".into(),
            year: Some(1995),
            best_with: "Best with 4 players".into(),
            recommended_with: "Recommended with 3–4 players".into(),
            avg_rating: Some(7.09),
            no_ratings: Some(123_456),
            rank: Some(Rank::NotRanked),
        });
        catan.played = true;

        let mut gone = Item::first_seen("Obscure", Availability::Unknown, since());
        gone.state_previous = Some(Availability::Unknown);
        gone.state_current = None;
        gone.status = Status::Removed;
        gone.external_id = ExternalId::Unresolved(Unresolved::NoMatch);
        gone.wishlist = true;
        vec![catan, gone]
    }

    #[test]
    fn dataset_survives_a_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final_data.csv");
        let items = sample();

        write_items(&path, &items).unwrap();
        assert!(!tmp_path(&path).exists());
        assert_eq!(load_dataset(&path).unwrap(), items);

        let text = fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, COLUMNS.join(","));
        assert!(text.contains("2024-01-01 10:15:30"));
        assert!(text.contains("Not Ranked"));
    }

    #[test]
    fn missing_file_is_first_run() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dataset(&dir.path().join("none.csv")).unwrap().is_empty());
    }

    #[test]
    fn v1_dataset_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final_data.csv");
        let v1 = format!(
            "{}\nAzul,Available,Unavailable,2024-02-03 04:05:06,State Change,230802,Azul,2017,,,7.8,90000,50\n",
            COLUMNS[..13].join(",")
        );
        fs::write(&path, v1).unwrap();

        let items = load_dataset(&path).unwrap();
        assert_eq!(items.len(), 1);
        assert!(!items[0].played && !items[0].wishlist);
        assert_eq!(items[0].metadata.as_ref().unwrap().rank, Some(Rank::Ranked(50)));
    }

    #[test]
    fn float_rendered_counts_are_read_as_integers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final_data.csv");
        let csv = format!(
            "{}\nAzul,,Available,2024-02-03 04:05:06,New Game,230802.0,Azul,2017.0,,,7.8,90000.0,50.0,True,\n",
            COLUMNS.join(",")
        );
        fs::write(&path, csv).unwrap();

        let items = load_dataset(&path).unwrap();
        let meta = items[0].metadata.as_ref().unwrap();
        assert_eq!(items[0].external_id, ExternalId::Resolved("230802".into()));
        assert_eq!(meta.year, Some(2017));
        assert_eq!(meta.no_ratings, Some(90_000));
        assert_eq!(meta.rank, Some(Rank::Ranked(50)));
        assert_eq!(meta.avg_rating, Some(7.8));
        assert!(items[0].played);
        assert!(!items[0].wishlist);
    }

    #[test]
    fn unreadable_cells_fail_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final_data.csv");
        let row = |year: &str, played: &str| {
            format!(
                "{}\nAzul,,Available,2024-02-03 04:05:06,New Game,230802,Azul,{year},,,7.8,90000,50,{played},False\n",
                COLUMNS.join(",")
            )
        };

        fs::write(&path, row("2017", "yes please")).unwrap();
        let err = format!("{:#}", load_dataset(&path).unwrap_err());
        assert!(err.contains("line 2"));
        assert!(err.contains("played"));

        fs::write(&path, row("2017.5", "True")).unwrap();
        let err = format!("{:#}", load_dataset(&path).unwrap_err());
        assert!(err.contains("year"));
    }

    #[test]
    fn schema_drift_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final_data.csv");
        fs::write(&path, "name,state\nAzul,Available\n").unwrap();
        let err = load_dataset(&path).unwrap_err();
        assert!(format!("{err:#}").contains("schema mismatch"));
    }

    #[test]
    fn flags_are_the_only_write_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final_data.csv");
        let items = sample();
        write_items(&path, &items).unwrap();

        let updated = update_flags(&path, "Obscure", Some(true), None).unwrap();
        assert!(updated.played && updated.wishlist);

        let reloaded = load_dataset(&path).unwrap();
        assert_eq!(reloaded[0], items[0]);
        assert_eq!(
            reloaded[1],
            Item {
                played: true,
                ..items[1].clone()
            }
        );
        assert!(update_flags(&path, "Nope", Some(true), None).is_err());
    }
}
