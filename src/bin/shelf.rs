use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use shelfwatch::config::TrackerConfig;
use shelfwatch::models::{Item, TIMESTAMP_FORMAT};
use shelfwatch::util::env as env_util;
use shelfwatch::{logging, now_local, report, store};

#[derive(Parser, Debug)]
#[command(name = "shelf", version, about = "Inspect and annotate the tracked board game dataset")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Games that changed state in the last run or within the recent window
    Recent {
        /// Window in days (defaults to SHELF_RECENT_DAYS or 7)
        #[arg(long)]
        days: Option<i64>,
    },
    /// Print dataset counts as JSON
    Stats,
    /// Set the played/wishlist flags of one game
    Mark {
        /// Exact catalog name of the game
        name: String,
        #[arg(long)]
        played: Option<bool>,
        #[arg(long)]
        wishlist: Option<bool>,
    },
}

fn print_row(item: &Item) {
    let state = item
        .state_current
        .map(|s| s.as_str())
        .unwrap_or_default();
    let rating = item
        .metadata
        .as_ref()
        .and_then(|m| m.avg_rating)
        .map(|r| format!("{r:.2}"))
        .unwrap_or_else(|| "-".into());
    let flags = match (item.played, item.wishlist) {
        (true, true) => "PW",
        (true, false) => "P ",
        (false, true) => " W",
        (false, false) => "  ",
    };
    println!(
        "{}  {:<12} {:<12} {:>5} {} {}",
        item.state_since.format(TIMESTAMP_FORMAT),
        item.status.as_str(),
        state,
        rating,
        flags,
        item.name
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_util::init_env();
    logging::init_tracing("warn", None)?;
    let cfg = TrackerConfig::from_env();
    let path = cfg.dataset_path();

    match cli.command {
        Commands::Recent { days } => {
            let items = store::load_dataset(&path)?;
            let days = days.unwrap_or(cfg.recent_days);
            let recent = report::recently_updated(&items, now_local(), days);
            if recent.is_empty() {
                println!("No games changed state in the last {days} day(s).");
            }
            for item in recent {
                print_row(item);
            }
        }
        Commands::Stats => {
            let items = store::load_dataset(&path)?;
            let stats = report::stats(&items);
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Mark {
            name,
            played,
            wishlist,
        } => {
            if played.is_none() && wishlist.is_none() {
                bail!("nothing to change: pass --played and/or --wishlist");
            }
            let item = store::update_flags(&path, &name, played, wishlist)?;
            print_row(&item);
        }
    }
    Ok(())
}
