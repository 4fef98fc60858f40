// src/feed/mod.rs

//! Remote feed fetching and decoding
//!
//! This module provides:
//! - Cache-first fetching of the four remote feeds (two catalogs, two
//!   analytics feeds)
//! - Decoding of the formula and cask catalogs, including unwrapping the
//!   signed envelope the cask feed may arrive in
//! - Reduction of analytics payloads to name -> install count maps
//! - Lazy lookup of a package's latest upstream release

mod client;
mod metadata;

pub use client::FeedClient;
pub use metadata::{
    BottleInfo, BottleSpec, CaskConflicts, CaskDependsOn, CaskInfo, FormulaInfo, FormulaUrls,
    FormulaVersions, LatestRelease, UrlSpec,
};

use crate::config::FeedSection;
use crate::error::{Error, Result};
use metadata::SignedEnvelope;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::debug;

/// The independent remote feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Formula,
    Cask,
    FormulaAnalytics,
    CaskAnalytics,
}

impl FeedKind {
    /// Cache key for this feed
    pub fn cache_key(self) -> &'static str {
        match self {
            FeedKind::Formula => "formula",
            FeedKind::Cask => "cask",
            FeedKind::FormulaAnalytics => "formula-analytics",
            FeedKind::CaskAnalytics => "cask-analytics",
        }
    }

    pub fn url(self, feeds: &FeedSection) -> &str {
        match self {
            FeedKind::Formula => &feeds.formula_url,
            FeedKind::Cask => &feeds.cask_url,
            FeedKind::FormulaAnalytics => &feeds.formula_analytics_url,
            FeedKind::CaskAnalytics => &feeds.cask_analytics_url,
        }
    }

    /// Item field naming the package in an analytics payload
    fn analytics_name_field(self) -> &'static str {
        match self {
            FeedKind::CaskAnalytics | FeedKind::Cask => "cask",
            FeedKind::FormulaAnalytics | FeedKind::Formula => "formula",
        }
    }
}

fn decode_json<T: DeserializeOwned>(source_name: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::DecodeError {
        source_name: source_name.to_string(),
        message: e.to_string(),
    })
}

/// Decode the formula catalog feed
pub fn decode_formulae(bytes: &[u8]) -> Result<Vec<FormulaInfo>> {
    decode_json(FeedKind::Formula.cache_key(), bytes)
}

/// Decode the cask catalog feed
///
/// The payload is either a plain JSON array or a signed envelope whose
/// `payload` field holds the array as JSON text.
pub fn decode_casks(bytes: &[u8]) -> Result<Vec<CaskInfo>> {
    let source_name = FeedKind::Cask.cache_key();
    let value: serde_json::Value = decode_json(source_name, bytes)?;

    let is_envelope = value
        .as_object()
        .and_then(|obj| obj.get("payload"))
        .is_some_and(|payload| payload.is_string());

    if is_envelope {
        debug!("Unwrapping signed cask envelope");
        let envelope: SignedEnvelope =
            serde_json::from_value(value).map_err(|e| Error::DecodeError {
                source_name: source_name.to_string(),
                message: format!("invalid envelope: {e}"),
            })?;
        decode_json(source_name, envelope.payload.as_bytes())
    } else {
        serde_json::from_value(value).map_err(|e| Error::DecodeError {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })
    }
}

/// Decode an analytics feed into a name -> count map
///
/// Items with a missing name or an unparsable count are skipped.
pub fn decode_analytics(kind: FeedKind, bytes: &[u8]) -> Result<HashMap<String, u64>> {
    #[derive(serde::Deserialize)]
    struct AnalyticsResponse {
        items: Vec<serde_json::Map<String, serde_json::Value>>,
    }

    let response: AnalyticsResponse = decode_json(kind.cache_key(), bytes)?;
    let name_field = kind.analytics_name_field();

    let mut counts = HashMap::with_capacity(response.items.len());
    for item in response.items {
        let Some(name) = item.get(name_field).and_then(|v| v.as_str()) else {
            continue;
        };
        let count = match item.get("count") {
            Some(serde_json::Value::String(s)) => parse_count(s),
            Some(serde_json::Value::Number(n)) => n.as_u64(),
            _ => None,
        };
        match count {
            Some(count) => {
                counts.insert(name.to_string(), count);
            }
            None => debug!("Skipping analytics item {} with unreadable count", name),
        }
    }

    Ok(counts)
}

/// Parse a decimal count that may contain thousands separators
pub fn parse_count(s: &str) -> Option<u64> {
    let digits: String = s.trim().chars().filter(|c| *c != ',').collect();
    digits.parse().ok()
}

/// Extract a GitHub `(owner, repo)` pair from a project URL
///
/// Accepts `https://github.com/owner/repo[/...]`, trimming a `.git` suffix.
pub fn github_repo(raw: &str) -> Option<(String, String)> {
    let parsed = url::Url::parse(raw).ok()?;
    let host = parsed.host_str()?;
    if host != "github.com" && host != "www.github.com" {
        return None;
    }

    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?.trim_end_matches(".git");
    if repo.is_empty() {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
