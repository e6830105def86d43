//! Per-run import log

use crate::publish::PublishReport;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What happened to one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum RecordAction {
    /// Created remotely
    Created,
    /// Updated; the remote version moved
    Updated {
        from: Option<u64>,
        to: Option<u64>,
    },
    /// Updated, but the remote version did not move
    Unchanged,
    /// Left out of the run
    Skipped { reason: String },
}

/// Log line for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    /// Record label
    pub label: String,
    /// Id in the export
    pub source_id: Option<String>,
    /// Id on the target hub
    pub new_id: Option<String>,
    /// Outcome
    #[serde(flatten)]
    pub action: RecordAction,
}

/// A dangling reference that was replaced by `null`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NulledReference {
    /// Owning record label
    pub label: String,
    /// Owning record id in the export
    pub source_id: Option<String>,
    /// Position in the body
    pub pointer: String,
    /// Id that could not be found
    pub target_id: String,
}

/// Schema issues found in validate-only mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// Record label
    pub label: String,
    /// Id in the export
    pub source_id: Option<String>,
    /// Validator messages
    pub messages: Vec<String>,
}

/// A content type that a real run would assign to a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAssignment {
    /// Target repository
    pub repository_id: String,
    /// Schema URI of the content type
    pub content_type_uri: String,
}

/// Everything a run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Number of creation levels
    pub levels: usize,
    /// Number of records resolved in two passes
    pub circular: usize,
    /// Per-record outcomes, in processing order
    pub records: Vec<RecordOutcome>,
    /// References replaced by `null`
    pub nulled: Vec<NulledReference>,
    /// Validate-only findings
    pub validation: Vec<ValidationIssue>,
    /// Validate-only: schemas that would get a content type registered
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_registrations: Vec<String>,
    /// Validate-only: content types that would be assigned
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_assignments: Vec<PendingAssignment>,
    /// Publish outcomes
    pub publish: PublishReport,
}

impl MigrationReport {
    /// Empty report stamped with the current time
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            levels: 0,
            circular: 0,
            records: Vec::new(),
            nulled: Vec::new(),
            validation: Vec::new(),
            pending_registrations: Vec::new(),
            pending_assignments: Vec::new(),
            publish: PublishReport::default(),
        }
    }

    /// Append a record outcome
    pub fn push(
        &mut self,
        label: impl Into<String>,
        source_id: Option<String>,
        new_id: Option<String>,
        action: RecordAction,
    ) {
        self.records.push(RecordOutcome {
            label: label.into(),
            source_id,
            new_id,
            action,
        });
    }

    /// Mark the run finished
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    fn count(&self, matches: impl Fn(&RecordAction) -> bool) -> usize {
        self.records.iter().filter(|r| matches(&r.action)).count()
    }

    /// Records created
    #[must_use]
    pub fn created(&self) -> usize {
        self.count(|a| matches!(a, RecordAction::Created))
    }

    /// Records updated (changed or not)
    #[must_use]
    pub fn updated(&self) -> usize {
        self.count(|a| matches!(a, RecordAction::Updated { .. } | RecordAction::Unchanged))
    }

    /// Records skipped
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|a| matches!(a, RecordAction::Skipped { .. }))
    }

    /// Outcomes for one source id, in order
    pub fn outcomes_for<'a>(&'a self, source_id: &'a str) -> impl Iterator<Item = &'a RecordOutcome> {
        self.records
            .iter()
            .filter(move |r| r.source_id.as_deref() == Some(source_id))
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} created, {} updated, {} skipped, {} nulled references, {} published, {} publish failures",
            self.created(),
            self.updated(),
            self.skipped(),
            self.nulled.len(),
            self.publish.succeeded.len(),
            self.publish.failed.len()
        )
    }
}

impl Default for MigrationReport {
    fn default() -> Self {
        Self::new()
    }
}
