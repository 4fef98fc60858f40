// src/catalog/deps.rs

//! Dependency closure queries over a finished catalog
//!
//! Both traversals keep a visited set, so cyclic declarations terminate.
//! Names without a catalog entry are unknown: they count as not installed
//! and have no outgoing edges.

use super::{Catalog, PackageKind};
use std::collections::{BTreeSet, HashSet};

impl Catalog {
    /// Everything that must be installed alongside `name`
    ///
    /// Empty when `name` is installed. Otherwise walks the runtime dependency
    /// graph from `name` (through installed nodes as well) and collects every
    /// reached dependency that is not installed. Sorted, without duplicates.
    pub fn missing_dependencies(&self, name: &str) -> Vec<String> {
        if self.is_installed(name) {
            return Vec::new();
        }

        self.closure(name, |catalog, node| {
            catalog
                .get(node)
                .map(|p| p.dependencies.clone())
                .unwrap_or_default()
        })
        .into_iter()
        .filter(|dep| !self.is_installed(dep))
        .collect()
    }

    /// Dependencies of one exact record that are not installed
    ///
    /// Unlike [`Catalog::missing_dependencies`] this ignores whether the
    /// record itself is installed, which is what an upgrade needs: the new
    /// version may declare dependencies the old one did not.
    pub fn unmet_dependencies(&self, name: &str, kind: PackageKind) -> Vec<String> {
        let Some(package) = self.get_kind(name, kind) else {
            return Vec::new();
        };

        let mut visited: HashSet<String> = HashSet::from([name.to_string()]);
        let mut reached = BTreeSet::new();
        self.walk(
            package.dependencies.clone(),
            &mut visited,
            &mut reached,
            |catalog, node| {
                catalog
                    .get(node)
                    .map(|p| p.dependencies.clone())
                    .unwrap_or_default()
            },
        );

        reached
            .into_iter()
            .filter(|dep| !self.is_installed(dep))
            .collect()
    }

    /// Everything installed that depends on `name`, directly or transitively
    ///
    /// Empty when `name` is not installed.
    pub fn installed_dependents(&self, name: &str) -> Vec<String> {
        if !self.is_installed(name) {
            return Vec::new();
        }

        self.closure(name, |catalog, node| {
            catalog
                .get(node)
                .map(|p| p.dependents.clone())
                .unwrap_or_default()
        })
        .into_iter()
        .filter(|dependent| self.is_installed(dependent))
        .collect()
    }

    /// Nodes reachable from `root` (excluding `root` itself)
    fn closure<F>(&self, root: &str, edges: F) -> BTreeSet<String>
    where
        F: Fn(&Catalog, &str) -> Vec<String>,
    {
        let mut visited: HashSet<String> = HashSet::from([root.to_string()]);
        let mut reached = BTreeSet::new();
        let start = edges(self, root);
        self.walk(start, &mut visited, &mut reached, edges);
        reached
    }

    fn walk<F>(
        &self,
        mut stack: Vec<String>,
        visited: &mut HashSet<String>,
        reached: &mut BTreeSet<String>,
        edges: F,
    ) where
        F: Fn(&Catalog, &str) -> Vec<String>,
    {
        stack.retain(|node| visited.insert(node.clone()));
        reached.extend(stack.iter().cloned());

        while let Some(node) = stack.pop() {
            for next in edges(self, &node) {
                if visited.insert(next.clone()) {
                    reached.insert(next.clone());
                    stack.push(next);
                }
            }
        }
    }
}
