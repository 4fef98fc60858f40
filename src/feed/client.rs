// src/feed/client.rs

//! HTTP client for feed downloads
//!
//! Every fetch is cache-first: a fresh cache entry is decoded directly,
//! otherwise the feed is downloaded, its raw bytes persisted, then decoded.
//! There is no retry. Transport, status and decode failures are distinct
//! errors and each one is terminal for the caller.

use super::metadata::{CaskInfo, FormulaInfo, LatestRelease};
use super::{FeedKind, decode_analytics, decode_casks, decode_formulae, github_repo};
use crate::cache::CacheStore;
use crate::catalog::Package;
use crate::config::FeedSection;
use crate::error::{Error, Result};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Feed client with a shared cache
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
    cache: Arc<CacheStore>,
    feeds: FeedSection,
}

impl FeedClient {
    /// Create a new feed client
    pub fn new(feeds: FeedSection, cache: Arc<CacheStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(feeds.timeout_secs))
            .user_agent(concat!("tapdex/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            cache,
            feeds,
        })
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Fetch raw bytes for `key`, preferring a fresh cache entry
    pub async fn fetch_bytes(&self, key: &str, url: &str) -> Result<Vec<u8>> {
        if let Some(bytes) = self.cache.read(key).await {
            return Ok(bytes);
        }

        info!("Fetching {} from {}", key, url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::DownloadError(format!("Failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::DownloadError(format!("Failed to read response from {url}: {e}")))?
            .to_vec();

        debug!("Fetched {} bytes for {}", bytes.len(), key);
        self.cache.write(key, &bytes).await;
        Ok(bytes)
    }

    async fn fetch_feed(&self, kind: FeedKind) -> Result<Vec<u8>> {
        self.fetch_bytes(kind.cache_key(), kind.url(&self.feeds)).await
    }

    /// Fetch and decode the formula catalog
    pub async fn fetch_formulae(&self) -> Result<Vec<FormulaInfo>> {
        let bytes = self.fetch_feed(FeedKind::Formula).await?;
        let formulae = decode_formulae(&bytes)?;
        info!("Loaded {} formulae", formulae.len());
        Ok(formulae)
    }

    /// Fetch and decode the cask catalog
    pub async fn fetch_casks(&self) -> Result<Vec<CaskInfo>> {
        let bytes = self.fetch_feed(FeedKind::Cask).await?;
        let casks = decode_casks(&bytes)?;
        info!("Loaded {} casks", casks.len());
        Ok(casks)
    }

    /// Fetch an analytics feed reduced to name -> 90-day count
    pub async fn fetch_analytics(&self, kind: FeedKind) -> Result<HashMap<String, u64>> {
        let bytes = self.fetch_feed(kind).await?;
        decode_analytics(kind, &bytes)
    }

    /// Look up the latest upstream release for a package
    ///
    /// Only packages whose homepage or a source URL points at a GitHub
    /// repository are looked up; for everything else this returns
    /// `Ok(None)` without a request.
    pub async fn latest_release(&self, package: &Package) -> Result<Option<LatestRelease>> {
        let Some((owner, repo)) = std::iter::once(&package.homepage)
            .chain(package.urls.iter())
            .find_map(|u| github_repo(u))
        else {
            debug!("{} has no GitHub project, skipping release lookup", package.name);
            return Ok(None);
        };

        let key = format!("release-{owner}-{repo}");
        let url = format!(
            "{}/repos/{owner}/{repo}/releases/latest",
            self.feeds.github_api_url.trim_end_matches('/')
        );

        let bytes = self.fetch_bytes(&key, &url).await?;
        let release: LatestRelease =
            serde_json::from_slice(&bytes).map_err(|e| Error::DecodeError {
                source_name: key,
                message: e.to_string(),
            })?;
        Ok(Some(release))
    }
}
