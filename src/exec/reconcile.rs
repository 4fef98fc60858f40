// src/exec/reconcile.rs

//! In-place catalog patches after a successful command
//!
//! Only the named record, plus any dependencies an install pulled in, is
//! touched. Sizes are measured before the write lock is taken so readers are
//! never blocked on the size command.

use super::{CommandRequest, Verb};
use crate::catalog::{Catalog, CatalogHandle, Package, PackageKind};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::scanner::Scanner;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Applies the effect of a successful command to the catalog
#[derive(Debug, Clone)]
pub struct Reconciler {
    scanner: Scanner,
    size_command: String,
}

/// A record to mark installed, with its freshly measured size
struct Measured {
    name: String,
    kind: PackageKind,
    size: Option<u64>,
}

impl Reconciler {
    pub fn new(config: &Config) -> Self {
        Self {
            scanner: Scanner::new(config),
            size_command: config.scan.size_command.clone(),
        }
    }

    /// Patch `handle` for a request that completed successfully
    pub async fn apply(&self, handle: &CatalogHandle, request: &CommandRequest) -> Result<()> {
        let CommandRequest { verb, name, kind } = request;
        let (name, kind) = (name.as_str(), *kind);

        match verb {
            Verb::Install | Verb::Upgrade => {
                let cascade = {
                    let catalog = handle.read().await;
                    require(&catalog, name, kind)?;
                    dependency_targets(&catalog, name, kind)
                };

                let target = self.measure(name, kind).await;
                let mut deps = Vec::with_capacity(cascade.len());
                for (dep, dep_kind) in cascade {
                    deps.push(self.measure(&dep, dep_kind).await);
                }

                let now = Utc::now();
                let mut catalog = handle.write().await;
                let package = require_mut(&mut catalog, name, kind)?;
                mark_installed(package, target.size, now);
                if *verb == Verb::Install {
                    package.installed_as_dependency = false;
                }

                for dep in &deps {
                    if let Some(package) = catalog.get_kind_mut(&dep.name, dep.kind) {
                        mark_installed(package, dep.size, now);
                        package.installed_as_dependency = true;
                    }
                }
                info!(
                    "Marked {} {} installed with {} dependencies",
                    kind,
                    name,
                    deps.len()
                );
            }
            Verb::Reinstall => {
                require(&*handle.read().await, name, kind)?;
                let measured = self.measure(name, kind).await;

                let mut catalog = handle.write().await;
                let package = require_mut(&mut catalog, name, kind)?;
                package.installed = true;
                package.installed_on = Some(Utc::now());
                package.size = measured.size;
            }
            Verb::Uninstall => {
                let mut catalog = handle.write().await;
                mark_uninstalled(require_mut(&mut catalog, name, kind)?);
                debug!("Marked {} {} uninstalled", kind, name);
            }
            Verb::Pin | Verb::Unpin => {
                let mut catalog = handle.write().await;
                require_mut(&mut catalog, name, kind)?.pinned = *verb == Verb::Pin;
            }
        }

        Ok(())
    }

    async fn measure(&self, name: &str, kind: PackageKind) -> Measured {
        Measured {
            name: name.to_string(),
            kind,
            size: self.scanner.measure(name, kind, &self.size_command).await,
        }
    }
}

/// Uninstalled dependencies of a record, with the kind of each catalog entry
///
/// Names without a catalog entry cannot be patched and are left out.
fn dependency_targets(
    catalog: &Catalog,
    name: &str,
    kind: PackageKind,
) -> Vec<(String, PackageKind)> {
    catalog
        .unmet_dependencies(name, kind)
        .into_iter()
        .filter_map(|dep| catalog.get(&dep).map(|p| (dep, p.kind)))
        .collect()
}

fn not_found(name: &str, kind: PackageKind) -> Error {
    Error::NotFoundError(format!("{kind} '{name}'"))
}

fn require<'a>(catalog: &'a Catalog, name: &str, kind: PackageKind) -> Result<&'a Package> {
    catalog.get_kind(name, kind).ok_or_else(|| not_found(name, kind))
}

fn require_mut<'a>(
    catalog: &'a mut Catalog,
    name: &str,
    kind: PackageKind,
) -> Result<&'a mut Package> {
    catalog
        .get_kind_mut(name, kind)
        .ok_or_else(|| not_found(name, kind))
}

fn mark_installed(package: &mut Package, size: Option<u64>, now: DateTime<Utc>) {
    package.installed = true;
    package.installed_version = Some(package.version.clone());
    package.installed_revision = package.revision;
    package.installed_on = Some(now);
    package.size = size;
    package.refresh_outdated();
}

fn mark_uninstalled(package: &mut Package) {
    package.installed = false;
    package.installed_version = None;
    package.installed_revision = 0;
    package.installed_as_dependency = false;
    package.installed_on = None;
    package.size = None;
    package.pinned = false;
    package.outdated = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutSection;
    use tempfile::TempDir;

    fn formula(name: &str, version: &str, installed: bool, deps: &[&str]) -> Package {
        let mut package = Package::new(name, PackageKind::Formula);
        package.version = version.to_string();
        package.dependencies = deps.iter().map(|d| d.to_string()).collect();
        if installed {
            package.installed = true;
            package.installed_version = Some(version.to_string());
        }
        package
    }

    fn reconciler(temp: &TempDir) -> Reconciler {
        let mut config = Config::default();
        config.layout = LayoutSection::with_prefix(temp.path());
        Reconciler::new(&config)
    }

    #[tokio::test]
    async fn test_install_cascades_to_missing_dependencies() {
        let temp = TempDir::new().unwrap();
        let handle = CatalogHandle::new(Catalog::from_packages(vec![
            formula("app", "2.0", false, &["libfoo", "zlib"]),
            formula("libfoo", "1.1", false, &["libbar"]),
            formula("libbar", "0.3", false, &[]),
            formula("zlib", "1.3", true, &[]),
            formula("bystander", "1.0", false, &[]),
        ]));
        assert_eq!(
            handle.read().await.missing_dependencies("app"),
            vec!["libbar", "libfoo"]
        );

        let request = CommandRequest::new(Verb::Install, "app", PackageKind::Formula);
        reconciler(&temp).apply(&handle, &request).await.unwrap();

        let catalog = handle.read().await;
        assert!(catalog.missing_dependencies("app").is_empty());
        let app = catalog.get("app").unwrap();
        assert!(app.installed);
        assert!(!app.installed_as_dependency);
        assert_eq!(app.installed_version.as_deref(), Some("2.0"));
        assert!(app.installed_on.is_some());
        for dep in ["libfoo", "libbar"] {
            let package = catalog.get(dep).unwrap();
            assert!(package.installed, "{dep} should be installed");
            assert!(package.installed_as_dependency);
        }
        assert!(!catalog.get("zlib").unwrap().installed_as_dependency);
        assert!(!catalog.get("bystander").unwrap().installed);
    }

    #[tokio::test]
    async fn test_upgrade_clears_outdated() {
        let temp = TempDir::new().unwrap();
        let mut tool = formula("tool", "2.0", true, &["newdep"]);
        tool.installed_version = Some("1.0".to_string());
        tool.installed_as_dependency = true;
        tool.refresh_outdated();
        assert!(tool.outdated);

        let handle = CatalogHandle::new(Catalog::from_packages(vec![
            tool,
            formula("newdep", "0.1", false, &[]),
        ]));

        let request = CommandRequest::new(Verb::Upgrade, "tool", PackageKind::Formula);
        reconciler(&temp).apply(&handle, &request).await.unwrap();

        let catalog = handle.read().await;
        let tool = catalog.get("tool").unwrap();
        assert!(!tool.outdated);
        assert_eq!(tool.installed_version.as_deref(), Some("2.0"));
        assert!(tool.installed_as_dependency);
        assert!(catalog.get("newdep").unwrap().installed);
    }

    #[tokio::test]
    async fn test_uninstall_and_pin() {
        let temp = TempDir::new().unwrap();
        let handle = CatalogHandle::new(Catalog::from_packages(vec![formula(
            "wget", "1.24.5", true, &[],
        )]));
        let reconciler = reconciler(&temp);

        let pin = CommandRequest::new(Verb::Pin, "wget", PackageKind::Formula);
        reconciler.apply(&handle, &pin).await.unwrap();
        assert!(handle.read().await.get("wget").unwrap().pinned);

        let unpin = CommandRequest::new(Verb::Unpin, "wget", PackageKind::Formula);
        reconciler.apply(&handle, &unpin).await.unwrap();
        assert!(!handle.read().await.get("wget").unwrap().pinned);

        reconciler.apply(&handle, &pin).await.unwrap();
        let uninstall = CommandRequest::new(Verb::Uninstall, "wget", PackageKind::Formula);
        reconciler.apply(&handle, &uninstall).await.unwrap();

        let catalog = handle.read().await;
        let wget = catalog.get("wget").unwrap();
        assert!(!wget.installed);
        assert!(!wget.pinned);
        assert!(wget.installed_version.is_none());
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let temp = TempDir::new().unwrap();
        let handle = CatalogHandle::default();
        let request = CommandRequest::new(Verb::Install, "ghost", PackageKind::Formula);
        let err = reconciler(&temp).apply(&handle, &request).await.unwrap_err();
        assert!(matches!(err, Error::NotFoundError(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reinstall_measures_size() {
        let temp = TempDir::new().unwrap();
        let keg = temp.path().join("Cellar/jq/1.7.1");
        std::fs::create_dir_all(&keg).unwrap();
        std::fs::write(keg.join("jq"), vec![1u8; 32 * 1024]).unwrap();

        let handle = CatalogHandle::new(Catalog::from_packages(vec![formula(
            "jq", "1.7.1", true, &[],
        )]));
        let request = CommandRequest::new(Verb::Reinstall, "jq", PackageKind::Formula);
        reconciler(&temp).apply(&handle, &request).await.unwrap();

        let catalog = handle.read().await;
        let jq = catalog.get("jq").unwrap();
        assert!(jq.size.unwrap() > 0);
        assert!(jq.installed_on.is_some());
    }
}
