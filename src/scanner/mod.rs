// src/scanner/mod.rs

//! Local installation scanning
//!
//! Enumerates the installation root for one package kind and reports one
//! [`InstalledItem`] per installed entry. Every entry is inspected by its own
//! task; results come back through a channel sized to the number of entries
//! so no task waits on a slow sibling. A failing entry is dropped and logged,
//! it never fails the scan.
//!
//! # Layout
//!
//! ```text
//! Cellar/
//!   wget/
//!     1.24.5_1/
//!       INSTALL_RECEIPT.json
//! Caskroom/
//!   firefox/
//!     .metadata/
//!       INSTALL_RECEIPT.json
//!     125.0/
//! var/homebrew/pinned/
//!   wget -> ../../../Cellar/wget/1.24.5_1
//! ```
//!
//! Items installed from a non-default tap also get their metadata extracted
//! from the tap's declarative file, because the authoritative feeds do not
//! list them.

mod description;
mod receipt;
mod size;

pub use description::{DeclaredPackage, version_from_url};
pub use receipt::{InstallReceipt, RECEIPT_FILE, ReceiptSource, ReceiptVersions};
pub use size::{measure_size, parse_du_output};

use crate::catalog::PackageKind;
use crate::config::{Config, LayoutSection};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Local installation evidence for one item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstalledItem {
    pub name: String,
    pub kind: PackageKind,
    pub version: String,
    pub revision: u32,
    /// Tap recorded in the receipt, if any
    pub tap: Option<String>,
    pub installed_as_dependency: bool,
    pub installed_on: Option<DateTime<Utc>>,
    pub pinned: bool,
    pub size: Option<u64>,
    /// Metadata from the declarative file, for non-default taps
    pub declared: Option<DeclaredPackage>,
}

/// Scanner over the configured installation layout
#[derive(Debug, Clone)]
pub struct Scanner {
    layout: LayoutSection,
    /// Size command, when size measurement is enabled
    size_command: Option<String>,
}

/// Shared state for the per-entry tasks of one scan
struct ScanContext {
    kind: PackageKind,
    taps: PathBuf,
    pinned: HashSet<String>,
    size_command: Option<String>,
}

impl Scanner {
    pub fn new(config: &Config) -> Self {
        Self {
            layout: config.layout.clone(),
            size_command: config
                .scan
                .measure_sizes
                .then(|| config.scan.size_command.clone()),
        }
    }

    pub fn layout(&self) -> &LayoutSection {
        &self.layout
    }

    /// Installation root for `kind`
    pub fn root(&self, kind: PackageKind) -> PathBuf {
        match kind {
            PackageKind::Formula => self.layout.cellar(),
            PackageKind::Cask => self.layout.caskroom(),
        }
    }

    /// Names carrying a pin marker
    pub async fn pinned_names(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        let dir = self.layout.pinned();
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            debug!("No pin directory at {}", dir.display());
            return names;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str()
                && !name.starts_with('.')
            {
                names.insert(name.to_string());
            }
        }
        names
    }

    /// Scan every installed item of `kind`
    pub async fn scan(&self, kind: PackageKind) -> Vec<InstalledItem> {
        let root = self.root(kind);
        let entries = match list_entries(&root).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Nothing to scan at {}: {}", root.display(), e);
                return Vec::new();
            }
        };

        let pinned = match kind {
            PackageKind::Formula => self.pinned_names().await,
            PackageKind::Cask => HashSet::new(),
        };

        let ctx = Arc::new(ScanContext {
            kind,
            taps: self.layout.taps(),
            pinned,
            size_command: self.size_command.clone(),
        });

        let (tx, mut rx) = mpsc::channel(entries.len().max(1));
        for (name, path) in entries {
            let tx = tx.clone();
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                let item = scan_entry(&ctx, name, path).await;
                let _ = tx.send(item).await;
            });
        }
        drop(tx);

        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            if let Some(item) = item {
                items.push(item);
            }
        }

        info!("Found {} installed {} entries", items.len(), kind);
        items
    }

    /// Measure the installed size of one item
    pub async fn measure(&self, name: &str, kind: PackageKind, command: &str) -> Option<u64> {
        measure_size(command, &self.root(kind).join(name)).await
    }
}

/// Visible entries of an installation root, as (name, path)
async fn list_entries(root: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(root).await?;
    while let Some(entry) = dir.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        entries.push((name, entry.path()));
    }
    Ok(entries)
}

/// The real install subdirectory of an entry
///
/// Hidden entries, symlinks and plain files are skipped. When more than one
/// version directory exists the greatest name is used.
async fn resolve_install_dir(entry: &Path) -> Option<(String, PathBuf)> {
    let mut dir = tokio::fs::read_dir(entry).await.ok()?;
    let mut candidates = Vec::new();

    while let Ok(Some(child)) = dir.next_entry().await {
        let Some(name) = child.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        // file_type() does not follow symlinks
        match child.file_type().await {
            Ok(ft) if ft.is_dir() => candidates.push((name, child.path())),
            _ => continue,
        }
    }

    candidates.sort();
    if candidates.len() > 1 {
        debug!(
            "{} has {} version directories, using the newest",
            entry.display(),
            candidates.len()
        );
    }
    candidates.pop()
}

/// Split a keg directory name `1.2.3_1` into version and revision
pub fn split_keg_name(keg: &str) -> (String, u32) {
    if let Some((version, revision)) = keg.rsplit_once('_')
        && !version.is_empty()
        && let Ok(revision) = revision.parse::<u32>()
    {
        return (version.to_string(), revision);
    }
    (keg.to_string(), 0)
}

async fn scan_entry(ctx: &ScanContext, name: String, entry: PathBuf) -> Option<InstalledItem> {
    let Some((version_dir, install_dir)) = resolve_install_dir(&entry).await else {
        warn!("Skipping {}: no install directory", entry.display());
        return None;
    };

    let (keg_version, revision) = match ctx.kind {
        PackageKind::Formula => split_keg_name(&version_dir),
        PackageKind::Cask => (version_dir, 0),
    };

    let receipt_path = match ctx.kind {
        PackageKind::Formula => install_dir.join(RECEIPT_FILE),
        PackageKind::Cask => entry.join(".metadata").join(RECEIPT_FILE),
    };
    let receipt = InstallReceipt::load(&receipt_path).await.unwrap_or_default();

    let version = receipt
        .version()
        .map(str::to_string)
        .unwrap_or(keg_version);
    let tap = receipt.tap().map(str::to_string);

    let declared = match tap.as_deref() {
        Some(tap) if tap != ctx.kind.default_tap() => {
            load_declared(ctx, &name, tap, receipt.source.path.as_deref()).await
        }
        _ => None,
    };

    let size = match &ctx.size_command {
        Some(command) => measure_size(command, &entry).await,
        None => None,
    };

    Some(InstalledItem {
        pinned: ctx.pinned.contains(&name),
        name,
        kind: ctx.kind,
        version,
        revision,
        tap,
        installed_as_dependency: receipt.installed_as_dependency,
        installed_on: receipt.installed_on(),
        size,
        declared,
    })
}

/// Locate and extract the declarative file of a third-party tap item
async fn load_declared(
    ctx: &ScanContext,
    name: &str,
    tap: &str,
    recorded_path: Option<&str>,
) -> Option<DeclaredPackage> {
    let path = match recorded_path.map(PathBuf::from) {
        Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => path,
        _ => tap_file_path(&ctx.taps, tap, ctx.kind, name)?,
    };

    match DeclaredPackage::load(&path).await {
        Ok(declared) => Some(declared),
        Err(e) => {
            warn!("No usable metadata for {} from {}: {}", name, tap, e);
            None
        }
    }
}

/// `<taps>/<user>/homebrew-<repo>/<Formula|Casks>/<name>.rb`
pub fn tap_file_path(taps: &Path, tap: &str, kind: PackageKind, name: &str) -> Option<PathBuf> {
    let (user, repo) = tap.split_once('/')?;
    let repo_dir = if repo.starts_with("homebrew-") {
        repo.to_string()
    } else {
        format!("homebrew-{repo}")
    };
    Some(
        taps.join(user)
            .join(repo_dir)
            .join(kind.tap_subdir())
            .join(format!("{name}.rb")),
    )
}
