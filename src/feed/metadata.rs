// src/feed/metadata.rs

//! Remote feed data structures
//!
//! Shapes of the formula and cask catalog feeds and of the GitHub release
//! endpoint. Only the fields the catalog consumes are modelled; everything
//! else in the payload is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One formula entry from the formula catalog feed
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormulaInfo {
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub tap: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub versions: FormulaVersions,
    #[serde(default)]
    pub urls: FormulaUrls,
    #[serde(default)]
    pub revision: u32,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub build_dependencies: Vec<String>,
    #[serde(default)]
    pub conflicts_with: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub bottle: BottleInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormulaVersions {
    #[serde(default)]
    pub stable: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormulaUrls {
    #[serde(default)]
    pub stable: Option<UrlSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UrlSpec {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BottleInfo {
    #[serde(default)]
    pub stable: Option<BottleSpec>,
}

/// Bottle files keyed by platform tag
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BottleSpec {
    #[serde(default)]
    pub files: BTreeMap<String, serde_json::Value>,
}

impl FormulaInfo {
    /// Platform tags with a prebuilt bottle, sorted
    pub fn platforms(&self) -> Vec<String> {
        self.bottle
            .stable
            .as_ref()
            .map(|spec| spec.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stable_version(&self) -> String {
        self.versions.stable.clone().unwrap_or_default()
    }

    pub fn source_urls(&self) -> Vec<String> {
        self.urls
            .stable
            .as_ref()
            .map(|spec| vec![spec.url.clone()])
            .unwrap_or_default()
    }
}

/// One cask entry from the cask catalog feed
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaskInfo {
    pub token: String,
    #[serde(default)]
    pub full_token: Option<String>,
    #[serde(default)]
    pub tap: Option<String>,
    /// Human-readable application names
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// The application updates itself once installed
    #[serde(default)]
    pub auto_updates: Option<bool>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub depends_on: CaskDependsOn,
    #[serde(default)]
    pub conflicts_with: Option<CaskConflicts>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaskDependsOn {
    #[serde(default)]
    pub formula: Vec<String>,
    #[serde(default)]
    pub cask: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaskConflicts {
    #[serde(default)]
    pub cask: Vec<String>,
}

impl CaskInfo {
    pub fn dependencies(&self) -> Vec<String> {
        self.depends_on
            .formula
            .iter()
            .chain(self.depends_on.cask.iter())
            .cloned()
            .collect()
    }

    pub fn conflicts(&self) -> Vec<String> {
        self.conflicts_with
            .as_ref()
            .map(|c| c.cask.clone())
            .unwrap_or_default()
    }
}

/// Signed envelope wrapping a JSON payload as a string
#[derive(Debug, Deserialize)]
pub(crate) struct SignedEnvelope {
    pub payload: String,
}

/// Latest published release of a package's upstream project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub html_url: String,
}
