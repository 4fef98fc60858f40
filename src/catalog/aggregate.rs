// src/catalog/aggregate.rs

//! Catalog aggregation
//!
//! One aggregation cycle runs six producers concurrently: the formula and
//! cask catalogs, their two analytics feeds, and the two local scans. Each
//! producer reports a [`SourceResult`] through a single channel. The cycle
//! waits for all of them, or stops at the first error: a catalog missing any
//! remote source would report wrong outdated and dependent information, so a
//! partial catalog is never built.
//!
//! [`merge`] is the pure second half. It turns the collected sources into
//! package records, derives install state, links dependents and sorts once.

use super::{Catalog, CatalogHandle, Package, PackageKind};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::feed::{CaskInfo, FeedClient, FeedKind, FormulaInfo};
use crate::scanner::{InstalledItem, Scanner};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Number of producers reporting in one cycle
const PRODUCERS: usize = 6;

/// Result envelope sent by every producer
#[derive(Debug)]
pub enum SourceResult {
    Formulae(Vec<FormulaInfo>),
    Casks(Vec<CaskInfo>),
    Analytics(PackageKind, HashMap<String, u64>),
    Installed(PackageKind, Vec<InstalledItem>),
}

/// Everything one cycle collected, ready to merge
#[derive(Debug, Default)]
pub struct CollectedSources {
    pub formulae: Vec<FormulaInfo>,
    pub casks: Vec<CaskInfo>,
    pub formula_analytics: HashMap<String, u64>,
    pub cask_analytics: HashMap<String, u64>,
    pub installed_formulae: Vec<InstalledItem>,
    pub installed_casks: Vec<InstalledItem>,
}

impl CollectedSources {
    fn absorb(&mut self, result: SourceResult) {
        match result {
            SourceResult::Formulae(formulae) => self.formulae = formulae,
            SourceResult::Casks(casks) => self.casks = casks,
            SourceResult::Analytics(kind, counts) => match kind {
                PackageKind::Formula => self.formula_analytics = counts,
                PackageKind::Cask => self.cask_analytics = counts,
            },
            SourceResult::Installed(kind, items) => match kind {
                PackageKind::Formula => self.installed_formulae = items,
                PackageKind::Cask => self.installed_casks = items,
            },
        }
    }
}

/// Runs aggregation cycles
#[derive(Debug, Clone)]
pub struct Aggregator {
    feeds: FeedClient,
    scanner: Scanner,
    platform: Option<String>,
}

impl Aggregator {
    pub fn new(config: &Config, cache: Arc<CacheStore>) -> Result<Self> {
        Ok(Self {
            feeds: FeedClient::new(config.feeds.clone(), cache)?,
            scanner: Scanner::new(config),
            platform: config.platform.clone(),
        })
    }

    pub fn feeds(&self) -> &FeedClient {
        &self.feeds
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Run every producer and wait for all of them or the first error
    pub async fn collect(&self) -> Result<CollectedSources> {
        self.feeds.cache().begin_cycle();

        let (tx, mut rx) = mpsc::channel::<Result<SourceResult>>(PRODUCERS);

        let feeds = self.feeds.clone();
        let sender = tx.clone();
        tokio::spawn(async move {
            let _ = sender
                .send(feeds.fetch_formulae().await.map(SourceResult::Formulae))
                .await;
        });

        let feeds = self.feeds.clone();
        let sender = tx.clone();
        tokio::spawn(async move {
            let _ = sender
                .send(feeds.fetch_casks().await.map(SourceResult::Casks))
                .await;
        });

        for (feed, kind) in [
            (FeedKind::FormulaAnalytics, PackageKind::Formula),
            (FeedKind::CaskAnalytics, PackageKind::Cask),
        ] {
            let feeds = self.feeds.clone();
            let sender = tx.clone();
            tokio::spawn(async move {
                let result = feeds
                    .fetch_analytics(feed)
                    .await
                    .map(|counts| SourceResult::Analytics(kind, counts));
                let _ = sender.send(result).await;
            });
        }

        for kind in [PackageKind::Formula, PackageKind::Cask] {
            let scanner = self.scanner.clone();
            let sender = tx.clone();
            tokio::spawn(async move {
                let items = scanner.scan(kind).await;
                let _ = sender.send(Ok(SourceResult::Installed(kind, items))).await;
            });
        }
        drop(tx);

        let mut sources = CollectedSources::default();
        for received in 0..PRODUCERS {
            match rx.recv().await {
                Some(Ok(result)) => sources.absorb(result),
                Some(Err(e)) => {
                    warn!("Aggregation aborted: {}", e);
                    return Err(e);
                }
                None => {
                    return Err(Error::ChannelClosed(format!(
                        "{} of {PRODUCERS} sources reported before a producer stopped",
                        received
                    )));
                }
            }
        }

        Ok(sources)
    }

    /// Run one full cycle and build a new catalog
    pub async fn load(&self) -> Result<Catalog> {
        let sources = self.collect().await?;
        let catalog = merge(sources, self.platform.as_deref());
        info!("Catalog built with {} packages", catalog.len());
        Ok(catalog)
    }

    /// Rebuild and swap the catalog behind `handle`
    ///
    /// On failure the previous catalog stays in place.
    pub async fn refresh(&self, handle: &CatalogHandle) -> Result<()> {
        let catalog = self.load().await?;
        handle.replace(catalog).await;
        Ok(())
    }
}

fn install_supported(disabled: bool, platforms: &[String], platform: Option<&str>) -> bool {
    if disabled {
        return false;
    }
    match platform {
        None => true,
        Some(_) if platforms.is_empty() => true,
        Some(tag) => platforms.iter().any(|p| p == tag || p == "all"),
    }
}

fn formula_package(info: FormulaInfo, downloads: &HashMap<String, u64>) -> Package {
    let mut package = Package::new(info.name.clone(), PackageKind::Formula);
    package.version = info.stable_version();
    package.urls = info.source_urls();
    package.platforms = info.platforms();
    package.downloads_90d = downloads.get(&info.name).copied().unwrap_or(0);
    if let Some(tap) = info.tap {
        package.tap = tap;
    }
    package.revision = info.revision;
    package.description = info.desc.unwrap_or_default();
    package.homepage = info.homepage.unwrap_or_default();
    package.license = info.license;
    package.dependencies = info.dependencies;
    package.build_dependencies = info.build_dependencies;
    package.conflicts = info.conflicts_with;
    package.deprecated = info.deprecated;
    package.disabled = info.disabled;
    package
}

fn cask_package(info: CaskInfo, downloads: &HashMap<String, u64>) -> Package {
    let mut package = Package::new(info.token.clone(), PackageKind::Cask);
    package.dependencies = info.dependencies();
    package.conflicts = info.conflicts();
    package.downloads_90d = downloads.get(&info.token).copied().unwrap_or(0);
    if let Some(tap) = info.tap {
        package.tap = tap;
    }
    package.version = info.version.unwrap_or_default();
    package.description = info
        .desc
        .or_else(|| info.name.into_iter().next())
        .unwrap_or_default();
    package.homepage = info.homepage.unwrap_or_default();
    package.urls = info.url.into_iter().collect();
    package.auto_updates = info.auto_updates.unwrap_or(false);
    package.deprecated = info.deprecated;
    package.disabled = info.disabled;
    package
}

/// Record for an item that only exists locally
fn local_package(item: &InstalledItem) -> Option<Package> {
    let Some(declared) = item.declared.clone() else {
        warn!(
            "Dropping {} {}: not in the feed and no declarative metadata",
            item.kind, item.name
        );
        return None;
    };

    let mut package = Package::new(item.name.clone(), item.kind);
    if let Some(tap) = &item.tap {
        package.tap = tap.clone();
    }
    package.version = declared.version;
    package.revision = declared.revision;
    package.description = declared.description;
    package.homepage = declared.homepage;
    package.urls = declared.urls;
    package.license = declared.license;
    package.dependencies = declared.dependencies;
    package.build_dependencies = declared.build_dependencies;
    package.conflicts = declared.conflicts;
    package.deprecated = declared.deprecated;
    package.disabled = declared.disabled;
    Some(package)
}

fn apply_installed(package: &mut Package, item: &InstalledItem) {
    package.installed = true;
    package.installed_version = Some(item.version.clone());
    package.installed_revision = item.revision;
    package.installed_as_dependency = item.installed_as_dependency;
    package.installed_on = item.installed_on;
    package.pinned = item.pinned;
    package.size = item.size;
    package.refresh_outdated();
}

/// Merge collected sources into a sorted catalog
pub fn merge(sources: CollectedSources, platform: Option<&str>) -> Catalog {
    let CollectedSources {
        formulae,
        casks,
        formula_analytics,
        cask_analytics,
        installed_formulae,
        installed_casks,
    } = sources;

    let installed: HashMap<(PackageKind, &str), &InstalledItem> = installed_formulae
        .iter()
        .chain(installed_casks.iter())
        .map(|item| ((item.kind, item.name.as_str()), item))
        .collect();
    let mut declared_keys: HashSet<(PackageKind, String)> = HashSet::new();

    let mut packages: Vec<Package> = Vec::with_capacity(formulae.len() + casks.len());
    packages.extend(
        formulae
            .into_iter()
            .map(|info| formula_package(info, &formula_analytics)),
    );
    packages.extend(
        casks
            .into_iter()
            .map(|info| cask_package(info, &cask_analytics)),
    );

    for package in packages.iter_mut() {
        declared_keys.insert((package.kind, package.name.clone()));
        if let Some(item) = installed.get(&(package.kind, package.name.as_str())) {
            apply_installed(package, item);
        }
    }

    for item in installed_formulae.iter().chain(installed_casks.iter()) {
        if declared_keys.contains(&(item.kind, item.name.clone())) {
            continue;
        }
        if let Some(mut package) = local_package(item) {
            debug!("Adding local-only {} {}", item.kind, item.name);
            package.downloads_90d = match item.kind {
                PackageKind::Formula => formula_analytics.get(&item.name),
                PackageKind::Cask => cask_analytics.get(&item.name),
            }
            .copied()
            .unwrap_or(0);
            apply_installed(&mut package, item);
            packages.push(package);
        }
    }

    let mut reverse: HashMap<String, BTreeSet<String>> = HashMap::new();
    for package in packages.iter_mut() {
        package.install_supported =
            install_supported(package.disabled, &package.platforms, platform);
        for dep in &package.dependencies {
            reverse
                .entry(dep.clone())
                .or_default()
                .insert(package.name.clone());
        }
    }

    let mut catalog = Catalog::from_packages(packages);
    for (name, dependents) in reverse {
        if let Some(package) = catalog.get_mut(&name) {
            package.dependents = dependents.into_iter().collect();
        }
    }

    catalog
}
