// src/config.rs

//! Configuration file parsing
//!
//! Supports TOML configuration files with the following sections:
//! - [feeds] - Remote catalog and analytics endpoints
//! - [cache] - Cache directory and freshness window
//! - [layout] - Installation prefix and the directories derived from it
//! - [scan] - Local scan options (size measurement)
//! - [commands] - External program used for mutating operations
//!
//! Top-level keys: `platform` (bottle tag used for install support) and
//! `default_filter` (predicate names applied at startup).

use crate::error::{Error, Result};
use crate::filter::Filter;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name under the platform config directory
const CONFIG_FILE: &str = "tapdex/config.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feeds: FeedSection,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub layout: LayoutSection,

    #[serde(default)]
    pub scan: ScanSection,

    #[serde(default)]
    pub commands: CommandSection,

    /// Bottle platform tag, e.g. `arm64_sonoma` or `x86_64_linux`
    #[serde(default)]
    pub platform: Option<String>,

    /// Filter predicates enabled at startup
    #[serde(default)]
    pub default_filter: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds: FeedSection::default(),
            cache: CacheSection::default(),
            layout: LayoutSection::default(),
            scan: ScanSection::default(),
            commands: CommandSection::default(),
            platform: None,
            default_filter: Vec::new(),
        }
    }
}

/// Remote feed endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSection {
    #[serde(default = "default_formula_url")]
    pub formula_url: String,

    #[serde(default = "default_cask_url")]
    pub cask_url: String,

    #[serde(default = "default_formula_analytics_url")]
    pub formula_analytics_url: String,

    #[serde(default = "default_cask_analytics_url")]
    pub cask_analytics_url: String,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            formula_url: default_formula_url(),
            cask_url: default_cask_url(),
            formula_analytics_url: default_formula_analytics_url(),
            cask_analytics_url: default_cask_analytics_url(),
            github_api_url: default_github_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_formula_url() -> String {
    "https://formulae.brew.sh/api/formula.json".to_string()
}

fn default_cask_url() -> String {
    "https://formulae.brew.sh/api/cask.jws.json".to_string()
}

fn default_formula_analytics_url() -> String {
    "https://formulae.brew.sh/api/analytics/install-on-request/90d.json".to_string()
}

fn default_cask_analytics_url() -> String {
    "https://formulae.brew.sh/api/analytics/cask-install/90d.json".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Cache settings
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Freshness window in hours
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

impl CacheSection {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 3600)
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tapdex")
}

fn default_ttl_hours() -> u64 {
    6
}

/// Installation layout
///
/// Every directory defaults to a fixed location under `prefix`.
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutSection {
    #[serde(default = "default_prefix")]
    pub prefix: PathBuf,

    #[serde(default)]
    pub cellar: Option<PathBuf>,

    #[serde(default)]
    pub caskroom: Option<PathBuf>,

    #[serde(default)]
    pub pinned: Option<PathBuf>,

    #[serde(default)]
    pub taps: Option<PathBuf>,
}

impl Default for LayoutSection {
    fn default() -> Self {
        Self::with_prefix(default_prefix())
    }
}

impl LayoutSection {
    /// Layout rooted at `prefix` with every directory at its default location
    pub fn with_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            cellar: None,
            caskroom: None,
            pinned: None,
            taps: None,
        }
    }

    pub fn cellar(&self) -> PathBuf {
        self.cellar
            .clone()
            .unwrap_or_else(|| self.prefix.join("Cellar"))
    }

    pub fn caskroom(&self) -> PathBuf {
        self.caskroom
            .clone()
            .unwrap_or_else(|| self.prefix.join("Caskroom"))
    }

    pub fn pinned(&self) -> PathBuf {
        self.pinned
            .clone()
            .unwrap_or_else(|| self.prefix.join("var/homebrew/pinned"))
    }

    pub fn taps(&self) -> PathBuf {
        self.taps
            .clone()
            .unwrap_or_else(|| self.prefix.join("Library/Taps"))
    }
}

fn default_prefix() -> PathBuf {
    if cfg!(target_os = "macos") {
        if cfg!(target_arch = "aarch64") {
            PathBuf::from("/opt/homebrew")
        } else {
            PathBuf::from("/usr/local")
        }
    } else {
        PathBuf::from("/home/linuxbrew/.linuxbrew")
    }
}

/// Local scan options
#[derive(Debug, Clone, Deserialize)]
pub struct ScanSection {
    /// Measure on-disk size of every installed item (slow)
    #[serde(default)]
    pub measure_sizes: bool,

    #[serde(default = "default_size_command")]
    pub size_command: String,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            measure_sizes: false,
            size_command: default_size_command(),
        }
    }
}

fn default_size_command() -> String {
    "du".to_string()
}

/// External program settings
#[derive(Debug, Clone, Deserialize)]
pub struct CommandSection {
    #[serde(default = "default_brew")]
    pub brew: PathBuf,
}

impl Default for CommandSection {
    fn default() -> Self {
        Self {
            brew: default_brew(),
        }
    }
}

fn default_brew() -> PathBuf {
    which::which("brew").unwrap_or_else(|_| PathBuf::from("brew"))
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let config = Self::parse(&content)
            .map_err(|e| Error::ConfigError(format!("{}: {e}", path.display())))?;

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from the default location when `path` is `None`
    ///
    /// A missing default file yields the default configuration.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match dirs::config_dir().map(|dir| dir.join(CONFIG_FILE)) {
            Some(default_path) if default_path.exists() => Self::load(&default_path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_hours == 0 {
            return Err(Error::ConfigError(
                "cache.ttl_hours must be greater than zero".to_string(),
            ));
        }

        if self.feeds.timeout_secs == 0 {
            return Err(Error::ConfigError(
                "feeds.timeout_secs must be greater than zero".to_string(),
            ));
        }

        // Refuse to start in an ambiguous filter state
        self.filter()?;
        Ok(())
    }

    /// Startup filter built from `default_filter`
    pub fn filter(&self) -> Result<Filter> {
        Ok(Filter::parse(&self.default_filter)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::filter::Predicate;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.ttl_hours, 6);
        assert_eq!(config.cache.ttl(), Duration::from_secs(6 * 3600));
        assert!(!config.scan.measure_sizes);
    }

    #[test]
    fn test_layout_defaults_follow_prefix() {
        let layout = LayoutSection::with_prefix("/tmp/brew");
        assert_eq!(layout.cellar(), PathBuf::from("/tmp/brew/Cellar"));
        assert_eq!(layout.caskroom(), PathBuf::from("/tmp/brew/Caskroom"));
        assert_eq!(layout.pinned(), PathBuf::from("/tmp/brew/var/homebrew/pinned"));
        assert_eq!(layout.taps(), PathBuf::from("/tmp/brew/Library/Taps"));
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
platform = "arm64_sonoma"
default_filter = ["installed", "formula"]

[cache]
dir = "/var/cache/tapdex"
ttl_hours = 2

[layout]
prefix = "/opt/homebrew"
caskroom = "/Applications/Caskroom"

[scan]
measure_sizes = true
"#;

        let config = Config::parse(toml_str).unwrap();
        assert_eq!(config.platform.as_deref(), Some("arm64_sonoma"));
        assert_eq!(config.cache.dir, PathBuf::from("/var/cache/tapdex"));
        assert_eq!(config.cache.ttl_hours, 2);
        assert_eq!(config.layout.cellar(), PathBuf::from("/opt/homebrew/Cellar"));
        assert_eq!(config.layout.caskroom(), PathBuf::from("/Applications/Caskroom"));
        assert!(config.scan.measure_sizes);
        assert_eq!(config.scan.size_command, "du");

        let filter = config.filter().unwrap();
        assert!(filter.contains(Predicate::Installed));
        assert!(filter.contains(Predicate::Formula));
    }

    #[test]
    fn test_conflicting_default_filter_rejected() {
        let toml_str = r#"default_filter = ["formula", "cask"]"#;
        let err = Config::parse(toml_str).unwrap_err();
        assert!(matches!(err, Error::Filter(FilterError::Conflict { .. })));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let toml_str = "[cache]\nttl_hours = 0\n";
        assert!(matches!(
            Config::parse(toml_str),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/tapdex.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
