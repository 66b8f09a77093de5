use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument, warn};

use super::retry::{run_with_retry, Attempt, RetryPolicy};
use super::xml::{parse_search, parse_thing, pick_match};
use super::EnrichmentService;
use crate::config::EnrichmentConfig;
use crate::models::{ExternalId, GameMetadata, Unresolved};
use crate::normalization::title::clean_query_name;

/// Client for the public board-game database's XML API.
#[derive(Clone)]
pub struct BggClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl BggClient {
    pub fn new(cfg: &EnrichmentConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("build enrichment HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            retry: cfg.retry.clone(),
        })
    }

    async fn attempt(&self, url: &str, query: &[(&str, &str)]) -> Attempt {
        let resp = match self.http.get(url).query(query).send().await {
            Ok(resp) => resp,
            Err(err) => return Attempt::Failed(err.to_string()),
        };
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Attempt::RateLimited(retry_after);
        }
        // 202 means the request was queued upstream; only 200 carries a body.
        if status != StatusCode::OK {
            return Attempt::Failed(format!("status {status}"));
        }
        match resp.text().await {
            Ok(body) => Attempt::Done(body),
            Err(err) => Attempt::Failed(err.to_string()),
        }
    }

    async fn get_xml(&self, label: &str, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let url = format!("{}/{}", self.base_url, path);
        let url = url.as_str();
        run_with_retry(&self.retry, label, move || self.attempt(url, query)).await
    }
}

#[async_trait]
impl EnrichmentService for BggClient {
    #[instrument(skip(self), level = "debug")]
    async fn search(&self, name: &str) -> ExternalId {
        let query = clean_query_name(name);
        let params = [("query", query.as_str()), ("type", "boardgame")];
        let body = match self.get_xml("search", "search", &params).await {
            Ok(body) => body,
            Err(err) => {
                warn!(name, error = %err, "identifier lookup failed at transport level");
                return ExternalId::Unresolved(Unresolved::TransportError);
            }
        };
        let hits = match parse_search(body.as_bytes()) {
            Ok(hits) => hits,
            Err(err) => {
                warn!(name, error = %err, "identifier lookup returned unreadable XML");
                return ExternalId::Unresolved(Unresolved::TransportError);
            }
        };
        match pick_match(&query, &hits) {
            Some(hit) if hit.name == query => {
                info!(name, id = %hit.id, "exact match");
                ExternalId::Resolved(hit.id.clone())
            }
            Some(hit) => {
                info!(name, id = %hit.id, matched = %hit.name, "closest match");
                ExternalId::Resolved(hit.id.clone())
            }
            None => {
                info!(name, query = %query, "no results");
                ExternalId::Unresolved(Unresolved::NoMatch)
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch_details(&self, id: &str) -> Option<GameMetadata> {
        let params = [("id", id), ("stats", "1")];
        let body = match self.get_xml("thing", "thing", &params).await {
            Ok(body) => body,
            Err(err) => {
                warn!(id, error = %err, "details fetch failed");
                return None;
            }
        };
        match parse_thing(body.as_bytes()) {
            Ok(Some(meta)) => {
                debug!(
                    id,
                    title = %meta.title,
                    year = ?meta.year,
                    avg_rating = ?meta.avg_rating,
                    rank = ?meta.rank,
                    "details fetched"
                );
                Some(meta)
            }
            Ok(None) => {
                warn!(id, "details answer held no item");
                None
            }
            Err(err) => {
                warn!(id, error = %err, "details answer unreadable");
                None
            }
        }
    }
}
