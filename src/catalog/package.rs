// src/catalog/package.rs

//! Package record
//!
//! A package is identified by `(name, kind)`. Formulae and casks are disjoint
//! namespaces, so a formula and a cask may share a name.

use crate::feed::LatestRelease;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// The two disjoint package classes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    #[default]
    Formula,
    Cask,
}

impl PackageKind {
    /// Tap that publishes this kind's authoritative feed
    pub fn default_tap(self) -> &'static str {
        match self {
            PackageKind::Formula => "homebrew/core",
            PackageKind::Cask => "homebrew/cask",
        }
    }

    /// Directory inside a tap holding this kind's declarative files
    pub fn tap_subdir(self) -> &'static str {
        match self {
            PackageKind::Formula => "Formula",
            PackageKind::Cask => "Casks",
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::Formula => write!(f, "formula"),
            PackageKind::Cask => write!(f, "cask"),
        }
    }
}

/// One merged catalog entry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Package {
    pub name: String,
    pub kind: PackageKind,
    /// Origin tap, e.g. `homebrew/core`
    pub tap: String,

    // declared
    pub version: String,
    pub revision: u32,
    pub description: String,
    pub homepage: String,
    pub urls: Vec<String>,
    pub license: Option<String>,
    pub dependencies: Vec<String>,
    pub build_dependencies: Vec<String>,
    pub conflicts: Vec<String>,
    /// One-hop inverse of `dependencies`; filled after the full merge
    pub dependents: Vec<String>,
    pub platforms: Vec<String>,
    pub downloads_90d: u64,

    // installation state
    pub installed: bool,
    pub installed_version: Option<String>,
    pub installed_revision: u32,
    pub installed_as_dependency: bool,
    pub installed_on: Option<DateTime<Utc>>,
    pub size: Option<u64>,

    // flags
    pub outdated: bool,
    pub pinned: bool,
    pub deprecated: bool,
    pub disabled: bool,
    /// Cask updates itself once installed
    pub auto_updates: bool,
    pub install_supported: bool,

    /// Fetched on demand, never during aggregation
    pub latest_release: Option<LatestRelease>,
}

impl Package {
    pub fn new(name: impl Into<String>, kind: PackageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            tap: kind.default_tap().to_string(),
            install_supported: true,
            ..Default::default()
        }
    }

    pub fn is_cask(&self) -> bool {
        self.kind == PackageKind::Cask
    }

    /// Declared version with a non-zero revision appended (`1.0_1`)
    pub fn full_version(&self) -> String {
        format_version(&self.version, self.revision)
    }

    /// Installed version with a non-zero revision appended
    pub fn installed_full_version(&self) -> Option<String> {
        self.installed_version
            .as_deref()
            .map(|v| format_version(v, self.installed_revision))
    }

    /// Recompute `outdated` from installed and declared versions
    ///
    /// Self-updating casks are treated as current once installed.
    pub fn refresh_outdated(&mut self) {
        self.outdated = match &self.installed_version {
            None => false,
            Some(_) if self.is_cask() && self.auto_updates => false,
            Some(installed) => {
                installed != &self.version || self.installed_revision < self.revision
            }
        };
    }
}

fn format_version(version: &str, revision: u32) -> String {
    if revision == 0 {
        version.to_string()
    } else {
        format!("{version}_{revision}")
    }
}
