//! Error types for cmig core
//!
//! Provides error handling for:
//! - Remote hub calls (repository, folder, record, type operations)
//! - Publish job submission and polling
//! - Mapping file persistence
//! - Whole-run aborts (fatal failures and declined confirmation gates)

use cmig_content::{ContentError, LoadError};
use std::path::PathBuf;

/// Main migration error type
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Remote hub call failed
    #[error("hub error: {0}")]
    Hub(#[from] HubError),

    /// Mapping file could not be written
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Export could not be loaded
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// Record body could not be edited
    #[error("content error: {0}")]
    Content(#[from] ContentError),

    /// Operator declined a confirmation gate
    #[error("aborted: {gate} was declined")]
    Declined { gate: String },

    /// Export names a repository the hub does not have
    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    /// Creating or updating a record failed; the run stops here
    #[error("failed to {action} '{label}': {source}")]
    RecordFailed {
        action: &'static str,
        label: String,
        #[source]
        source: HubError,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl MigrateError {
    /// Whether an operator said no
    #[inline]
    #[must_use]
    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Declined { .. })
    }

    /// Whether the run stopped because of a remote or local failure
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_declined()
    }

    /// Create a declined-gate error
    #[inline]
    pub fn declined(gate: impl Into<String>) -> Self {
        Self::Declined { gate: gate.into() }
    }
}

/// Errors reported by the repository service
#[derive(Debug, Clone, thiserror::Error)]
pub enum HubError {
    /// Requested object does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Request was rejected by the service
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Service could not be reached
    #[error("hub unavailable: {0}")]
    Unavailable(String),
}

impl HubError {
    /// Create not-found error
    #[inline]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether this is a not-found error
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Publish job errors
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PublishError {
    /// Publish start returned a non-success status
    #[error("publish start rejected with status {status}")]
    StartRejected { status: u16 },

    /// Publish start succeeded but carried no job location
    #[error("publish start returned no job location")]
    MissingLocation,

    /// Record has no remote id to publish
    #[error("record '{label}' has no remote id")]
    NotCreated { label: String },

    /// Transport failure while starting or polling
    #[error("publish request failed: {message}")]
    Request { message: String },

    /// Job reported FAILED
    #[error("publish job {location} failed")]
    JobFailed { location: String },

    /// Poll budget exhausted without a terminal state
    #[error("publish job {location} did not finish after {attempts} polls")]
    Exhausted { location: String, attempts: u32 },
}

/// Mapping persistence errors
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// IO error writing the mapping file
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Mapping could not be serialized
    #[error("could not serialize mapping: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declined_is_not_fatal() {
        let err = MigrateError::declined("type creation");
        assert!(err.is_declined());
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "aborted: type creation was declined");
    }

    #[test]
    fn record_failure_is_fatal() {
        let err = MigrateError::RecordFailed {
            action: "create",
            label: "Banner".to_string(),
            source: HubError::Unavailable("timeout".to_string()),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("failed to create 'Banner'"));
    }

    #[test]
    fn hub_not_found_helper() {
        let err = HubError::not_found("folder", "f-1");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "folder not found: f-1");
    }
}
