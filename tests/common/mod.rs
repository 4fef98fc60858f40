// tests/common/mod.rs

//! Shared fixtures for integration tests.
//!
//! A fixture is a temporary installation prefix plus a cache directory that
//! already holds fresh copies of every feed, so an aggregation cycle never
//! touches the network. Feed URLs point at an unroutable local port to make
//! any accidental fetch fail loudly.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tapdex::Config;
use tapdex::config::LayoutSection;
use tempfile::TempDir;

/// Address nothing listens on
pub const UNREACHABLE: &str = "http://127.0.0.1:9";

pub const FORMULAE: &str = r#"[
    {"name": "foo", "tap": "homebrew/core", "desc": "Foo tool", "homepage": "https://foo.example",
     "versions": {"stable": "1.0"}, "revision": 0, "dependencies": ["libbar"],
     "bottle": {"stable": {"files": {"arm64_sonoma": {}}}}},
    {"name": "libbar", "tap": "homebrew/core", "desc": "Bar library", "homepage": "https://bar.example",
     "versions": {"stable": "2.1"}, "revision": 1, "dependencies": ["libbaz"]},
    {"name": "libbaz", "tap": "homebrew/core", "desc": "Baz library", "homepage": "https://baz.example",
     "versions": {"stable": "0.5"}, "dependencies": []},
    {"name": "jq", "tap": "homebrew/core", "desc": "JSON processor", "homepage": "https://jqlang.github.io/jq/",
     "versions": {"stable": "1.7.1"}, "dependencies": []}
]"#;

pub const CASKS: &str = r#"[
    {"token": "firefox", "name": ["Mozilla Firefox"], "desc": "Web browser",
     "homepage": "https://www.mozilla.org/firefox/", "version": "125.0", "auto_updates": true},
    {"token": "viewer", "name": ["Viewer"], "version": "3.0",
     "depends_on": {"formula": ["jq"]}}
]"#;

pub const FORMULA_ANALYTICS: &str = r#"{"items": [
    {"number": 1, "formula": "jq", "count": "12,345"},
    {"number": 2, "formula": "foo", "count": "678"}
]}"#;

pub const CASK_ANALYTICS: &str = r#"{"items": [
    {"number": 1, "cask": "firefox", "count": "99,000"}
]}"#;

/// Temporary prefix and cache for one test
pub struct Fixture {
    pub temp: TempDir,
}

impl Fixture {
    /// Empty prefix with all four feeds cached
    pub fn new() -> Self {
        let fixture = Self {
            temp: TempDir::new().unwrap(),
        };
        fixture.cache_feed("formula", FORMULAE);
        fixture.cache_feed("cask", CASKS);
        fixture.cache_feed("formula-analytics", FORMULA_ANALYTICS);
        fixture.cache_feed("cask-analytics", CASK_ANALYTICS);
        fixture
    }

    pub fn prefix(&self) -> PathBuf {
        self.temp.path().join("prefix")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.temp.path().join("cache")
    }

    /// Config bound to this fixture, with feeds pointing nowhere
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.layout = LayoutSection::with_prefix(self.prefix());
        config.cache.dir = self.cache_dir();
        config.feeds.formula_url = format!("{UNREACHABLE}/formula.json");
        config.feeds.cask_url = format!("{UNREACHABLE}/cask.json");
        config.feeds.formula_analytics_url = format!("{UNREACHABLE}/formula-analytics.json");
        config.feeds.cask_analytics_url = format!("{UNREACHABLE}/cask-analytics.json");
        config.feeds.github_api_url = UNREACHABLE.to_string();
        config.feeds.timeout_secs = 2;
        config
    }

    pub fn cache_feed(&self, key: &str, body: &str) {
        write(&self.cache_dir().join(format!("{key}.json")), body);
    }

    /// Installed formula keg with a receipt
    pub fn install_formula(&self, name: &str, keg: &str, receipt: &str) {
        let dir = self.prefix().join("Cellar").join(name).join(keg);
        write(&dir.join("INSTALL_RECEIPT.json"), receipt);
    }

    /// Installed cask with its metadata receipt
    pub fn install_cask(&self, token: &str, version: &str, receipt: &str) {
        let dir = self.prefix().join("Caskroom").join(token);
        std::fs::create_dir_all(dir.join(version)).unwrap();
        write(&dir.join(".metadata/INSTALL_RECEIPT.json"), receipt);
    }

    pub fn pin(&self, name: &str) {
        write(&self.prefix().join("var/homebrew/pinned").join(name), "");
    }

    /// Declarative file inside a third-party tap checkout
    pub fn tap_formula(&self, user: &str, repo: &str, name: &str, content: &str) {
        let path = self
            .prefix()
            .join("Library/Taps")
            .join(user)
            .join(format!("homebrew-{repo}"))
            .join("Formula")
            .join(format!("{name}.rb"));
        write(&path, content);
    }
}

/// Receipt JSON for a given tap and version
pub fn receipt(tap: &str, version: &str, as_dependency: bool) -> String {
    format!(
        r#"{{"installed_as_dependency": {as_dependency}, "installed_on_request": {}, "time": 1700000000,
            "source": {{"tap": "{tap}", "versions": {{"stable": "{version}"}}}}}}"#,
        !as_dependency
    )
}

pub fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}
