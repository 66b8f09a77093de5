use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use tracing::warn;

use super::CatalogSource;
use crate::config::CatalogConfig;

/// HTTP access to the retailer's paginated lending-library listing.
#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
    user_agent: String,
}

impl CatalogClient {
    pub fn new(cfg: &CatalogConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("build catalog HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
            user_agent: cfg.user_agent.clone(),
        })
    }
}

#[async_trait]
impl CatalogSource for CatalogClient {
    async fn fetch_page(&self, page: u32) -> Option<String> {
        let page_param = page.to_string();
        let resp = self
            .http
            .get(&self.base_url)
            .header(USER_AGENT, &self.user_agent)
            .query(&[
                ("page", page_param.as_str()),
                ("restore_auto_pagination", "true"),
            ])
            .send()
            .await;
        let resp = match resp {
            Ok(resp) => resp,
            Err(err) => {
                warn!(page, error = %err, "catalog page request failed");
                return None;
            }
        };
        if resp.status() != StatusCode::OK {
            warn!(page, status = %resp.status(), "catalog page not served");
            return None;
        }
        match resp.text().await {
            Ok(body) => Some(body),
            Err(err) => {
                warn!(page, error = %err, "catalog page body unreadable");
                None
            }
        }
    }
}
