use anyhow::{Context, Result};
use clap::Parser;
use shelfwatch::catalog::client::CatalogClient;
use shelfwatch::config::TrackerConfig;
use shelfwatch::enrichment::bgg::BggClient;
use shelfwatch::orchestrator::{run_once, RunContext};
use shelfwatch::util::env as env_util;
use shelfwatch::{logging, now_local};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "shelfwatch",
    version,
    about = "Track lending-library board game availability and enrich it from BoardGameGeek"
)]
struct Cli {}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _cli = Cli::parse();
    env_util::init_env();

    let cfg = TrackerConfig::from_env();
    logging::init_tracing("info", Some(&cfg.log_file))?;
    cfg.log_snapshot();

    let catalog = CatalogClient::new(&cfg.catalog, cfg.http_timeout)?;
    let bgg = BggClient::new(&cfg.enrichment, cfg.http_timeout)?;
    let ctx = RunContext {
        config: &cfg,
        catalog: &catalog,
        enrichment: &bgg,
        now: now_local(),
    };

    let outcome = match run_once(&ctx).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(error = %format!("{err:#}"), "run failed");
            return Err(err).context("shelfwatch run");
        }
    };

    info!(summary = ?outcome.summary, "run summary");
    for item in &outcome.changed {
        let state = item
            .state_current
            .map(|s| s.as_str())
            .unwrap_or_default();
        println!("{:<14} {:<12} {}", item.status.as_str(), state, item.name);
    }
    Ok(())
}
