//! Error types for content records
//!
//! Covers:
//! - Record parsing (file → `ContentRecord`)
//! - Export directory traversal
//! - Body edits at a dependency position

use std::path::PathBuf;

/// Errors raised while reading or editing a single content record
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// Record JSON could not be parsed
    #[error("invalid record in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// IO error reading a record file
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record body has no `_meta.schema`
    #[error("record '{label}' has no _meta.schema")]
    MissingSchema { label: String },

    /// A JSON pointer no longer addresses a value in the body
    #[error("no editable value at {pointer}")]
    PositionNotFound { pointer: String },
}

impl ContentError {
    /// Create parse error for path
    pub fn parse_error(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that stop an export directory from being loaded at all
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Root directory does not exist or is not a directory
    #[error("export root {0} is not a directory")]
    NotADirectory(PathBuf),

    /// Directory listing failed
    #[error("io error listing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
