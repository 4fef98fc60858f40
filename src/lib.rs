// src/lib.rs

//! Tapdex Package Catalog Engine
//!
//! Builds one sorted catalog of formulae and casks by merging the remote
//! catalog feeds, their install analytics and the state of the local
//! installation, then keeps it current as package commands run.
//!
//! # Architecture
//!
//! - Cache-first feeds: remote payloads are persisted and reused within a TTL
//! - One aggregation cycle: six concurrent producers, one channel, all or nothing
//! - Tolerant scanning: a bad receipt or description costs one entry, never the scan
//! - Explicit catalog handle: replaced wholesale on refresh, patched in place after commands
//! - Bitmask filters with mutually exclusive predicate groups

pub mod cache;
pub mod catalog;
pub mod config;
mod error;
pub mod exec;
pub mod feed;
pub mod filter;
pub mod scanner;

pub use cache::{CacheStore, Clock, SystemClock};
pub use catalog::{Aggregator, Catalog, CatalogHandle, Package, PackageKind};
pub use config::Config;
pub use error::{Error, FilterError, Result};
pub use exec::{
    CommandEvent, CommandExecutor, CommandOutput, CommandRequest, Reconciler, StreamKind, Verb,
};
pub use feed::{FeedClient, FeedKind, LatestRelease};
pub use filter::{Filter, Predicate, PredicateGroup};
pub use scanner::{InstalledItem, Scanner};
