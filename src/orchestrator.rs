//! One pipeline run: scrape, normalize, reconcile, enrich, persist.
use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::catalog::{scrape_all_pages, CatalogSource};
use crate::config::TrackerConfig;
use crate::enrichment::{fetch_metadata, resolve_identifiers, EnrichmentService};
use crate::enrichment::{IdentifierStats, MetadataStats};
use crate::models::{Item, Status};
use crate::normalization::snapshot::normalize;
use crate::reconcile::reconcile;
use crate::store;

/// Everything a run needs, passed explicitly; lives for exactly one run.
pub struct RunContext<'a> {
    pub config: &'a TrackerConfig,
    pub catalog: &'a dyn CatalogSource,
    pub enrichment: &'a dyn EnrichmentService,
    /// Timestamp stamped on every state change of this run.
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pages: u32,
    pub raw_listings: usize,
    pub items_scraped: usize,
    pub new: usize,
    pub state_change: usize,
    pub no_change: usize,
    pub removed: usize,
    pub identifiers: IdentifierStats,
    pub metadata: MetadataStats,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    /// New and changed items, as written to the change file.
    pub changed: Vec<Item>,
}

pub async fn run_once(ctx: &RunContext<'_>) -> Result<RunOutcome> {
    let cfg = ctx.config;
    let dataset_path = cfg.dataset_path();

    // Schema problems surface before any network traffic.
    let prior = store::load_dataset(&dataset_path)?;

    let scrape = scrape_all_pages(ctx.catalog, cfg.catalog.max_pages).await;
    let snapshot = normalize(&scrape.listings);
    if snapshot.is_empty() {
        bail!(
            "catalog produced no listings after {} page(s); dataset left untouched",
            scrape.pages
        );
    }
    info!(
        pages = scrape.pages,
        raw = scrape.listings.len(),
        items = snapshot.len(),
        "scraping complete"
    );

    let reconciled = reconcile(prior, &snapshot, ctx.now)?;
    let mut summary = RunSummary {
        pages: scrape.pages,
        raw_listings: scrape.listings.len(),
        items_scraped: snapshot.len(),
        new: reconciled.count(Status::New),
        state_change: reconciled.count(Status::StateChange),
        no_change: reconciled.count(Status::NoChange),
        removed: reconciled.count(Status::Removed),
        ..RunSummary::default()
    };
    let mut merged = reconciled.merged;
    info!(
        new = summary.new,
        state_change = summary.state_change,
        no_change = summary.no_change,
        removed = summary.removed,
        "stock availability updates"
    );

    summary.identifiers =
        resolve_identifiers(&mut merged, ctx.enrichment, cfg.enrichment.selection).await;
    summary.metadata = fetch_metadata(&mut merged, ctx.enrichment).await;
    if summary.metadata.failed > 0 {
        warn!(
            failed = summary.metadata.failed,
            "some details could not be fetched; they will be retried next run"
        );
    }

    // Re-derived so the change file carries this run's enrichment.
    let changed: Vec<Item> = merged
        .iter()
        .filter(|i| i.status.is_change())
        .cloned()
        .collect();

    info!("saving output files");
    store::write_items(&dataset_path, &merged)?;
    store::write_items(&cfg.changes_path(), &changed)?;
    info!(
        rows = merged.len(),
        changed = changed.len(),
        lookups = summary.identifiers.requested,
        resolved = summary.identifiers.resolved,
        details = summary.metadata.fetched,
        "complete"
    );

    Ok(RunOutcome { summary, changed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::FakeCatalog;
    use crate::enrichment::testing::FakeService;
    use crate::models::Availability;
    use chrono::NaiveDate;
    use std::path::Path;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, day)
            .and_then(|d| d.and_hms_opt(7, 0, 0))
            .unwrap()
    }

    fn config(dir: &Path) -> TrackerConfig {
        let mut cfg = TrackerConfig::default();
        cfg.output_dir = dir.to_path_buf();
        cfg.log_file = dir.join("test.log");
        cfg
    }

    fn service() -> FakeService {
        FakeService::default()
            .with_game("Azul", "230802", "Azul")
            .with_game("Catan", "13", "CATAN")
    }

    async fn run(
        cfg: &TrackerConfig,
        catalog: &FakeCatalog,
        svc: &FakeService,
        now: NaiveDateTime,
    ) -> Result<RunOutcome> {
        let ctx = RunContext {
            config: cfg,
            catalog,
            enrichment: svc,
            now,
        };
        run_once(&ctx).await
    }

    #[tokio::test]
    async fn first_run_builds_and_enriches_the_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let catalog = FakeCatalog::from_cards(&[&[
            ("Azul (Sv)", "Finns i lager"),
            ("Catan", "Beställningsvara"),
            ("Homebrew", "Finns i lager"),
        ]]);
        let svc = service().with_game("Azul (Sv)", "230802", "Azul");

        let out = run(&cfg, &catalog, &svc, at(1)).await.unwrap();
        assert_eq!(out.summary.new, 3);
        assert_eq!(out.summary.identifiers.resolved, 2);
        assert_eq!(out.summary.identifiers.no_match, 1);
        assert_eq!(out.summary.metadata.fetched, 2);
        assert_eq!(out.changed.len(), 3);

        let stored = store::load_dataset(&cfg.dataset_path()).unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|i| i.state_since == at(1)));
        let catan = stored.iter().find(|i| i.name == "Catan").unwrap();
        assert_eq!(catan.metadata.as_ref().unwrap().title, "CATAN");
        assert_eq!(store::load_dataset(&cfg.changes_path()).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unchanged_second_run_makes_no_enrichment_calls() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let catalog = FakeCatalog::from_cards(&[&[
            ("Azul", "Finns i lager"),
            ("Catan", "Finns i lager"),
        ]]);
        let svc = service();

        run(&cfg, &catalog, &svc, at(1)).await.unwrap();
        let calls = svc.calls();
        let out = run(&cfg, &catalog, &svc, at(2)).await.unwrap();

        assert_eq!(svc.calls(), calls);
        assert_eq!(out.summary.no_change, 2);
        assert!(out.changed.is_empty());
        let stored = store::load_dataset(&cfg.dataset_path()).unwrap();
        assert!(stored.iter().all(|i| i.state_since == at(1)));
        assert!(store::load_dataset(&cfg.changes_path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn flags_and_history_survive_catalog_churn() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let svc = service();
        let both = FakeCatalog::from_cards(&[&[
            ("Azul", "Finns i lager"),
            ("Catan", "Finns i lager"),
        ]]);
        run(&cfg, &both, &svc, at(1)).await.unwrap();
        store::update_flags(&cfg.dataset_path(), "Catan", Some(true), Some(true)).unwrap();

        let catan_lent = FakeCatalog::from_cards(&[&[
            ("Azul", "Finns i lager"),
            ("Catan", "Beställningsvara"),
        ]]);
        let azul_only = FakeCatalog::from_cards(&[&[("Azul", "Beställningsvara")]]);
        run(&cfg, &catan_lent, &svc, at(2)).await.unwrap();
        let out = run(&cfg, &azul_only, &svc, at(3)).await.unwrap();
        assert_eq!(out.summary.removed, 1);
        run(&cfg, &both, &svc, at(4)).await.unwrap();

        let stored = store::load_dataset(&cfg.dataset_path()).unwrap();
        let catan = stored.iter().find(|i| i.name == "Catan").unwrap();
        assert!(catan.played && catan.wishlist);
        assert_eq!(catan.status, Status::StateChange);
        assert_eq!(catan.state_current, Some(Availability::Available));
        assert_eq!(catan.state_since, at(4));
        assert!(catan.metadata.is_some());
    }

    #[tokio::test]
    async fn empty_catalog_aborts_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let svc = service();
        let catalog = FakeCatalog::default();

        let err = run(&cfg, &catalog, &svc, at(1)).await.unwrap_err();
        assert!(err.to_string().contains("no listings"));
        assert!(!cfg.dataset_path().exists());
        assert_eq!(svc.calls(), 0);
    }
}
