// src/filter.rs

//! Catalog filter predicates
//!
//! A small fixed set of named predicates packed into one bitmask. Predicates
//! belong to mutual-exclusion groups: at most one predicate per group can be
//! active. Enabling a predicate clears the rest of its group, and parsing a
//! list of names that holds two members of one group is rejected.
//!
//! # Example
//!
//! ```
//! use tapdex::filter::{Filter, Predicate};
//!
//! let mut filter = Filter::parse(&["formula", "installed"]).unwrap();
//! filter.enable(Predicate::Cask);
//! assert!(!filter.contains(Predicate::Formula));
//! assert_eq!(filter.to_string(), "cask,installed");
//! ```

use crate::catalog::{Package, PackageKind};
use crate::error::FilterError;
use std::fmt;
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// A single filter predicate; discriminant is its bit position
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Predicate {
    Formula = 0,
    Cask = 1,
    Installed = 2,
    Outdated = 3,
    /// Installed on request rather than as a dependency
    Explicit = 4,
    /// Neither deprecated nor disabled
    Active = 5,
}

impl Predicate {
    /// Mask with only this predicate's bit set
    pub const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Mutual-exclusion group this predicate belongs to
    pub const fn group(self) -> PredicateGroup {
        match self {
            Predicate::Formula | Predicate::Cask => PredicateGroup::Kind,
            Predicate::Installed
            | Predicate::Outdated
            | Predicate::Explicit
            | Predicate::Active => PredicateGroup::State,
        }
    }

    /// Whether a package satisfies this predicate
    pub fn matches(self, package: &Package) -> bool {
        match self {
            Predicate::Formula => package.kind == PackageKind::Formula,
            Predicate::Cask => package.kind == PackageKind::Cask,
            Predicate::Installed => package.installed,
            Predicate::Outdated => package.outdated,
            Predicate::Explicit => package.installed && !package.installed_as_dependency,
            Predicate::Active => !package.deprecated && !package.disabled,
        }
    }
}

/// Mutual-exclusion group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum PredicateGroup {
    Kind,
    State,
}

impl PredicateGroup {
    /// Combined mask of every member
    pub fn mask(self) -> u8 {
        self.members().fold(0, |mask, p| mask | p.bit())
    }

    /// Members in bit-position order
    pub fn members(self) -> impl Iterator<Item = Predicate> {
        Predicate::iter().filter(move |p| p.group() == self)
    }
}

/// Set of enabled predicates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    bits: u8,
}

impl Filter {
    /// Filter with no predicates enabled (matches everything)
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Raw mask
    pub const fn bits(self) -> u8 {
        self.bits
    }

    /// Rebuild a filter from a raw mask
    ///
    /// Unknown bits are dropped; a mask holding two members of one group is
    /// rejected like the equivalent name list.
    pub fn from_bits(bits: u8) -> Result<Self, FilterError> {
        let names: Vec<&'static str> = Predicate::iter()
            .filter(|p| bits & p.bit() != 0)
            .map(Into::into)
            .collect();
        Self::parse(&names)
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub fn contains(self, predicate: Predicate) -> bool {
        self.bits & predicate.bit() != 0
    }

    /// Set `predicate`, clearing every other member of its group first
    pub fn enable(&mut self, predicate: Predicate) {
        self.bits &= !predicate.group().mask();
        self.bits |= predicate.bit();
    }

    pub fn disable(&mut self, predicate: Predicate) {
        self.bits &= !predicate.bit();
    }

    /// Flip membership of `predicate`; turning it on still honors its group
    pub fn toggle(&mut self, predicate: Predicate) {
        if self.contains(predicate) {
            self.disable(predicate);
        } else {
            self.enable(predicate);
        }
    }

    /// Enabled predicates in bit-position order
    pub fn split(self) -> Vec<Predicate> {
        Predicate::iter().filter(|p| self.contains(*p)).collect()
    }

    /// Whether a package satisfies every enabled predicate
    pub fn matches(self, package: &Package) -> bool {
        self.split().into_iter().all(|p| p.matches(package))
    }

    /// Parse a list of predicate names into a mask
    ///
    /// Repeating a name is harmless; naming two members of one group is a
    /// conflict.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, FilterError> {
        let mut bits = 0u8;
        for name in names {
            let name = name.as_ref().trim();
            let predicate = Predicate::from_str(name)
                .map_err(|_| FilterError::UnknownPredicate(name.to_string()))?;
            bits |= predicate.bit();
        }

        for group in PredicateGroup::iter() {
            let members: Vec<String> = group
                .members()
                .filter(|p| bits & p.bit() != 0)
                .map(|p| p.to_string())
                .collect();
            if members.len() > 1 {
                return Err(FilterError::Conflict {
                    group: group.to_string(),
                    members,
                });
            }
        }

        Ok(Self { bits })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&'static str> = self.split().into_iter().map(Into::into).collect();
        write!(f, "{}", names.join(","))
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<&str> = s.split(',').map(str::trim).filter(|n| !n.is_empty()).collect();
        Self::parse(&names)
    }
}
