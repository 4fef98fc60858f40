// src/scanner/receipt.rs

//! Installation receipts
//!
//! A receipt is written at install time and records where an item came from
//! and why it was installed. Every field is optional: an absent or damaged
//! receipt only means less is known about the item.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// File name of a receipt
pub const RECEIPT_FILE: &str = "INSTALL_RECEIPT.json";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstallReceipt {
    #[serde(default)]
    pub installed_as_dependency: bool,
    #[serde(default)]
    pub installed_on_request: bool,
    /// Unix seconds
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub source: ReceiptSource,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiptSource {
    #[serde(default)]
    pub tap: Option<String>,
    /// Path of the declarative file the item was installed from
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub versions: Option<ReceiptVersions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiptVersions {
    #[serde(default)]
    pub stable: Option<String>,
}

impl InstallReceipt {
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Read a receipt, tolerating absence and malformed content
    pub async fn load(path: &Path) -> Option<Self> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("No receipt at {}: {}", path.display(), e);
                return None;
            }
        };

        match Self::parse(&bytes) {
            Ok(receipt) => Some(receipt),
            Err(e) => {
                warn!("Ignoring malformed receipt {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Recorded version; `versions.stable` takes precedence over `version`
    pub fn version(&self) -> Option<&str> {
        self.source
            .versions
            .as_ref()
            .and_then(|v| v.stable.as_deref())
            .or(self.source.version.as_deref())
    }

    pub fn installed_on(&self) -> Option<DateTime<Utc>> {
        self.time.and_then(|t| DateTime::from_timestamp(t, 0))
    }

    pub fn tap(&self) -> Option<&str> {
        self.source.tap.as_deref()
    }
}
