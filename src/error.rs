// src/error.rs

//! Error types for the catalog engine
//!
//! Source errors (transport, status, decode) are fatal to an aggregation
//! cycle. Local-scan problems are recovered per entry and never reach this
//! type as a cycle failure; they only surface when a caller asks for a single
//! entry directly.

use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure while fetching a feed
    #[error("download failed: {0}")]
    DownloadError(String),

    /// Feed answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Feed payload could not be decoded
    #[error("failed to decode {source_name}: {message}")]
    DecodeError { source_name: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic parse failure
    #[error("parse error: {0}")]
    ParseError(String),

    /// Declarative description lacks a required field
    #[error("{path}: missing required field '{field}'")]
    MissingField { path: String, field: &'static str },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid filter configuration
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// External command could not be started
    #[error("failed to spawn '{command}': {message}")]
    SpawnFailed { command: String, message: String },

    /// External command exited unsuccessfully
    #[error("'{command}' failed with {}", exit_label(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        /// Combined stdout/stderr lines, in delivery order
        output: Vec<String>,
    },

    /// Named package is not in the catalog
    #[error("not found: {0}")]
    NotFoundError(String),

    /// A producer went away before reporting
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "termination by signal".to_string(),
    }
}

/// Errors from parsing or combining filter predicates
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Name does not match any predicate
    #[error("unknown filter predicate: {0}")]
    UnknownPredicate(String),

    /// Two or more predicates from one mutual-exclusion group
    #[error("conflicting filters in group '{group}': {}", members.join(", "))]
    Conflict { group: String, members: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_display() {
        let err = Error::CommandFailed {
            command: "brew install foo".to_string(),
            code: Some(1),
            output: vec![],
        };
        assert_eq!(err.to_string(), "'brew install foo' failed with exit code 1");

        let err = Error::CommandFailed {
            command: "brew install foo".to_string(),
            code: None,
            output: vec![],
        };
        assert!(err.to_string().ends_with("termination by signal"));
    }

    #[test]
    fn test_filter_conflict_display() {
        let err = FilterError::Conflict {
            group: "kind".to_string(),
            members: vec!["formula".to_string(), "cask".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "conflicting filters in group 'kind': formula, cask"
        );
    }
}
