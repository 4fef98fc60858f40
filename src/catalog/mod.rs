// src/catalog/mod.rs

//! The merged package catalog
//!
//! A catalog is built wholesale by one aggregation cycle and kept sorted by
//! `(name, kind)` until it is replaced, which makes name lookup a binary
//! search. After construction the only writer is the reconciler, which patches
//! individual records in place through a [`CatalogHandle`].
//!
//! # Lookup
//!
//! [`Catalog::get`] resolves a bare name; when a formula and a cask share a
//! name the formula wins, matching how dependency names are declared.
//! [`Catalog::get_kind`] is exact.

mod aggregate;
mod deps;
mod package;

pub use aggregate::{Aggregator, CollectedSources, SourceResult, merge};
pub use package::{Package, PackageKind};

use crate::error::{Error, Result};
use crate::feed::LatestRelease;
use crate::filter::Filter;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Sorted collection of package records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    packages: Vec<Package>,
}

impl Catalog {
    /// Build a catalog, sorting the records once
    pub fn from_packages(mut packages: Vec<Package>) -> Self {
        packages.sort_by(|a, b| (a.name.as_str(), a.kind).cmp(&(b.name.as_str(), b.kind)));
        Self { packages }
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Index of the first record named `name`
    fn position(&self, name: &str) -> Option<usize> {
        let idx = self.packages.partition_point(|p| p.name.as_str() < name);
        (self.packages.get(idx)?.name == name).then_some(idx)
    }

    fn position_kind(&self, name: &str, kind: PackageKind) -> Option<usize> {
        self.packages
            .binary_search_by(|p| (p.name.as_str(), p.kind).cmp(&(name, kind)))
            .ok()
    }

    /// Look up by name, preferring the formula on a collision
    pub fn get(&self, name: &str) -> Option<&Package> {
        self.position(name).map(|idx| &self.packages[idx])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Package> {
        self.position(name).map(move |idx| &mut self.packages[idx])
    }

    pub fn get_kind(&self, name: &str, kind: PackageKind) -> Option<&Package> {
        self.position_kind(name, kind).map(|idx| &self.packages[idx])
    }

    pub fn get_kind_mut(&mut self, name: &str, kind: PackageKind) -> Option<&mut Package> {
        self.position_kind(name, kind)
            .map(move |idx| &mut self.packages[idx])
    }

    /// Whether `name` is installed; unknown names are not installed
    pub fn is_installed(&self, name: &str) -> bool {
        self.get(name).is_some_and(|p| p.installed)
    }

    pub fn installed(&self) -> Vec<&Package> {
        self.packages.iter().filter(|p| p.installed).collect()
    }

    pub fn outdated(&self) -> Vec<&Package> {
        self.packages.iter().filter(|p| p.outdated).collect()
    }

    /// Records satisfying every predicate enabled in `filter`
    pub fn filtered(&self, filter: Filter) -> Vec<&Package> {
        self.packages.iter().filter(|p| filter.matches(p)).collect()
    }

    /// Attach lazily fetched release metadata to a record
    pub fn set_latest_release(
        &mut self,
        name: &str,
        kind: PackageKind,
        release: Option<LatestRelease>,
    ) -> Result<()> {
        let package = self
            .get_kind_mut(name, kind)
            .ok_or_else(|| Error::NotFoundError(format!("{kind} '{name}'")))?;
        package.latest_release = release;
        Ok(())
    }
}

/// Shared handle to the current catalog
///
/// Refresh swaps in a whole new catalog; the reconciler patches records
/// under the write lock.
#[derive(Debug, Clone, Default)]
pub struct CatalogHandle {
    inner: Arc<RwLock<Catalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            inner: Arc::new(RwLock::new(catalog)),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.inner.write().await
    }

    /// Replace the catalog wholesale
    pub async fn replace(&self, catalog: Catalog) {
        *self.inner.write().await = catalog;
    }

    /// Clone of the current catalog
    pub async fn snapshot(&self) -> Catalog {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Predicate;

    fn package(name: &str, kind: PackageKind, installed: bool) -> Package {
        let mut package = Package::new(name, kind);
        package.installed = installed;
        package
    }

    fn sample() -> Catalog {
        Catalog::from_packages(vec![
            package("wget", PackageKind::Formula, true),
            package("docker", PackageKind::Cask, false),
            package("docker", PackageKind::Formula, true),
            package("alacritty", PackageKind::Cask, true),
            package("jq", PackageKind::Formula, false),
        ])
    }

    #[test]
    fn test_sorted_by_name_then_kind() {
        let catalog = sample();
        let keys: Vec<_> = catalog
            .packages()
            .iter()
            .map(|p| (p.name.as_str(), p.kind))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("alacritty", PackageKind::Cask),
                ("docker", PackageKind::Formula),
                ("docker", PackageKind::Cask),
                ("jq", PackageKind::Formula),
                ("wget", PackageKind::Formula),
            ]
        );
        for pair in catalog.packages().windows(2) {
            assert!(pair[0].name <= pair[1].name);
        }
    }

    #[test]
    fn test_lookup() {
        let catalog = sample();
        assert_eq!(catalog.get("docker").unwrap().kind, PackageKind::Formula);
        assert_eq!(
            catalog.get_kind("docker", PackageKind::Cask).unwrap().kind,
            PackageKind::Cask
        );
        assert!(catalog.get("alacritty").unwrap().is_cask());
        assert!(catalog.get("zsh").is_none());
        assert!(catalog.get_kind("jq", PackageKind::Cask).is_none());
    }

    #[test]
    fn test_is_installed_unknown() {
        let catalog = sample();
        assert!(catalog.is_installed("wget"));
        assert!(!catalog.is_installed("jq"));
        assert!(!catalog.is_installed("does-not-exist"));
    }

    #[test]
    fn test_filtered() {
        let catalog = sample();
        let filter = Filter::parse(&["installed", "formula"]).unwrap();
        let names: Vec<_> = catalog.filtered(filter).iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["docker", "wget"]);

        let mut filter = Filter::empty();
        filter.enable(Predicate::Cask);
        assert_eq!(catalog.filtered(filter).len(), 2);
    }

    #[test]
    fn test_set_latest_release_unknown() {
        let mut catalog = sample();
        let err = catalog
            .set_latest_release("zsh", PackageKind::Formula, None)
            .unwrap_err();
        assert!(matches!(err, Error::NotFoundError(_)));
    }

    #[tokio::test]
    async fn test_handle_replace() {
        let handle = CatalogHandle::new(sample());
        assert_eq!(handle.read().await.len(), 5);

        handle.replace(Catalog::default()).await;
        assert!(handle.read().await.is_empty());
    }
}
