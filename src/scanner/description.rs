// src/scanner/description.rs

//! Best-effort field extraction from declarative package files
//!
//! Formula and cask files are Ruby source. Rather than parse Ruby, each field
//! is pulled out by a line pattern. The format is not a stable contract, so
//! optional fields fail soft (they are simply absent) and only `version`,
//! `desc` and `homepage` are required. `version` may be inferred from a
//! source URL's file name when no `version` line exists.

use crate::error::{Error, Result};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*version\s+"([^"]+)""#).unwrap());

static REVISION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*revision\s+(\d+)").unwrap());

static DESC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*desc\s+"([^"]+)""#).unwrap());

static HOMEPAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*homepage\s+"([^"]+)""#).unwrap());

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*url\s+"([^"]+)""#).unwrap());

static LICENSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*license\s+"([^"]+)""#).unwrap());

/// `depends_on "x"`, `depends_on "x" => :build`, `depends_on "x" => [:build, :test]`,
/// `depends_on formula: "x"`
static DEPENDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*depends_on\s+(?:(?:formula|cask):\s*)?"([^"]+)"(\s*=>\s*(?::build|\[[^\]]*:build[^\]]*\]))?"#)
        .unwrap()
});

/// `conflicts_with "x"` or keyed, e.g. `conflicts_with cask: "x"`
static CONFLICTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*conflicts_with\s+(?:\w+:\s*)?"([^"]+)""#).unwrap()
});

static URL_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)+").unwrap());

/// Archive suffixes stripped before inferring a version, longest first
const ARCHIVE_EXTENSIONS: &[&str] = &[
    ".tar.gz", ".tar.bz2", ".tar.xz", ".tar.zst", ".tgz", ".tbz", ".txz", ".tar", ".zip",
    ".dmg", ".pkg", ".gz", ".bz2", ".xz",
];

const DEPRECATED_MARKER: &str = "deprecate!";
const DISABLED_MARKER: &str = "disable!";

/// Metadata extracted from a declarative file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredPackage {
    pub version: String,
    pub revision: u32,
    pub description: String,
    pub homepage: String,
    pub urls: Vec<String>,
    pub license: Option<String>,
    pub dependencies: Vec<String>,
    pub build_dependencies: Vec<String>,
    pub conflicts: Vec<String>,
    pub deprecated: bool,
    pub disabled: bool,
}

fn first_capture(re: &Regex, content: &str) -> Option<String> {
    re.captures(content).map(|c| c[1].to_string())
}

impl DeclaredPackage {
    /// Extract metadata from file content
    ///
    /// `origin` names the file in errors.
    pub fn extract(content: &str, origin: &str) -> Result<Self> {
        let urls: Vec<String> = URL_RE
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect();

        let version = first_capture(&VERSION_RE, content)
            .or_else(|| urls.iter().find_map(|u| version_from_url(u)))
            .ok_or_else(|| missing(origin, "version"))?;
        let description =
            first_capture(&DESC_RE, content).ok_or_else(|| missing(origin, "desc"))?;
        let homepage =
            first_capture(&HOMEPAGE_RE, content).ok_or_else(|| missing(origin, "homepage"))?;

        let revision = first_capture(&REVISION_RE, content)
            .and_then(|r| r.parse().ok())
            .unwrap_or(0);

        let mut dependencies = Vec::new();
        let mut build_dependencies = Vec::new();
        for caps in DEPENDS_RE.captures_iter(content) {
            let name = caps[1].to_string();
            if caps.get(2).is_some() {
                build_dependencies.push(name);
            } else {
                dependencies.push(name);
            }
        }

        let conflicts = CONFLICTS_RE
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect();

        Ok(Self {
            version,
            revision,
            description,
            homepage,
            urls,
            license: first_capture(&LICENSE_RE, content),
            dependencies,
            build_dependencies,
            conflicts,
            deprecated: content.contains(DEPRECATED_MARKER),
            disabled: content.contains(DISABLED_MARKER),
        })
    }

    /// Read and extract a declarative file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::extract(&content, &path.display().to_string())
    }
}

fn missing(origin: &str, field: &'static str) -> Error {
    Error::MissingField {
        path: origin.to_string(),
        field,
    }
}

/// Infer a version from the file name of a source URL
///
/// `https://example.com/dl/foo-1.2.3.tar.gz` yields `1.2.3`.
pub fn version_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = path.rsplit('/').find(|s| !s.is_empty())?;

    let stem = ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext))
        .unwrap_or(file_name);

    URL_VERSION_RE.find(stem).map(|m| m.as_str().to_string())
}
