use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::enrichment::retry::RetryPolicy;
use crate::enrichment::selector::SelectionPolicy;
use crate::util::env::{env_flag, env_opt, env_parse, redact_url};

pub const DATASET_FILE: &str = "final_data.csv";
pub const CHANGES_FILE: &str = "changes.csv";
pub const LOG_FILE: &str = "shelfwatch.log";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Pages `1..max_pages` are fetched at most.
    pub max_pages: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dragonslair.se/lanebiblioteket/".into(),
            user_agent: DEFAULT_USER_AGENT.into(),
            max_pages: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub base_url: String,
    pub retry: RetryPolicy,
    pub selection: SelectionPolicy,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            base_url: "https://boardgamegeek.com/xmlapi2".into(),
            retry: RetryPolicy::default(),
            selection: SelectionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub output_dir: PathBuf,
    pub log_file: PathBuf,
    pub http_timeout: Duration,
    pub recent_days: i64,
    pub catalog: CatalogConfig,
    pub enrichment: EnrichmentConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let output_dir = PathBuf::from("output");
        Self {
            log_file: output_dir.join(LOG_FILE),
            output_dir,
            http_timeout: Duration::from_secs(30),
            recent_days: 7,
            catalog: CatalogConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(dir) = env_opt("SHELF_OUTPUT_DIR") {
            cfg.output_dir = PathBuf::from(dir);
            cfg.log_file = cfg.output_dir.join(LOG_FILE);
        }
        if let Some(path) = env_opt("SHELF_LOG_FILE") {
            cfg.log_file = PathBuf::from(path);
        }
        cfg.http_timeout = Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 30u64).max(1));
        cfg.recent_days = env_parse("SHELF_RECENT_DAYS", cfg.recent_days).max(0);

        if let Some(url) = env_opt("SHELF_CATALOG_URL") {
            cfg.catalog.base_url = url;
        }
        if let Some(ua) = env_opt("SHELF_USER_AGENT") {
            cfg.catalog.user_agent = ua;
        }
        cfg.catalog.max_pages = env_parse("SHELF_MAX_PAGES", cfg.catalog.max_pages).max(2);

        if let Some(url) = env_opt("BGG_BASE_URL") {
            cfg.enrichment.base_url = url.trim_end_matches('/').to_string();
        }
        let retry = &mut cfg.enrichment.retry;
        retry.max_attempts = env_parse("BGG_MAX_ATTEMPTS", retry.max_attempts).max(1);
        retry.max_rate_limit_waits = env_parse("BGG_MAX_RATE_LIMIT_WAITS", retry.max_rate_limit_waits);
        retry.rate_limit_wait = Duration::from_secs(env_parse("BGG_RATE_LIMIT_SECS", 10u64));
        retry.backoff_base = Duration::from_millis(env_parse("BGG_BACKOFF_MS", 1000u64));
        cfg.enrichment.selection.retry_unresolved = env_flag("SHELF_RETRY_UNRESOLVED", true);
        cfg
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.output_dir.join(DATASET_FILE)
    }

    pub fn changes_path(&self) -> PathBuf {
        self.output_dir.join(CHANGES_FILE)
    }

    /// The resolved settings as `(name, value)` pairs, URLs credential-masked.
    pub fn snapshot(&self) -> Vec<(&'static str, String)> {
        let retry = &self.enrichment.retry;
        vec![
            ("output_dir", self.output_dir.display().to_string()),
            ("log_file", self.log_file.display().to_string()),
            ("http_timeout_secs", self.http_timeout.as_secs().to_string()),
            ("recent_days", self.recent_days.to_string()),
            ("catalog_url", redact_url(&self.catalog.base_url)),
            ("user_agent", self.catalog.user_agent.clone()),
            ("max_pages", self.catalog.max_pages.to_string()),
            ("bgg_base_url", redact_url(&self.enrichment.base_url)),
            ("bgg_max_attempts", retry.max_attempts.to_string()),
            ("bgg_max_rate_limit_waits", retry.max_rate_limit_waits.to_string()),
            ("bgg_rate_limit_secs", retry.rate_limit_wait.as_secs().to_string()),
            ("bgg_backoff_ms", retry.backoff_base.as_millis().to_string()),
            (
                "retry_unresolved",
                self.enrichment.selection.retry_unresolved.to_string(),
            ),
        ]
    }

    /// Log the effective configuration once at startup.
    pub fn log_snapshot(&self) {
        info!(target: "preflight", snapshot = ?self.snapshot(), "configuration snapshot");
    }
}
