//! Remote collaborator seams
//!
//! The orchestrator talks to the content hub only through these traits:
//! - [`RepositoryService`]: repositories, folders, records, content types
//! - [`PublishService`]: asynchronous publish jobs
//! - [`Validator`]: schema compliance of a record body
//! - [`Confirm`]: operator yes/no decisions
//!
//! Transport, authentication and retry live behind the implementations.

use crate::error::HubError;
use cmig_content::ContentRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Remote id
    pub id: String,
    /// Machine name
    pub name: String,
    /// Display label
    pub label: String,
    /// Schema URIs of the content types assigned to this repository
    #[serde(default)]
    pub content_types: Vec<String>,
}

impl Repository {
    /// Whether `name` matches this repository's name or label
    #[inline]
    #[must_use]
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.label == name
    }

    /// Whether a type for `schema_uri` is assigned here
    #[inline]
    #[must_use]
    pub fn has_content_type(&self, schema_uri: &str) -> bool {
        self.content_types.iter().any(|uri| uri == schema_uri)
    }
}

/// Folder inside a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    /// Remote id
    pub id: String,
    /// Folder name (one path segment)
    pub name: String,
    /// Owning repository
    pub repository_id: String,
}

/// Where subfolders are listed or created
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderParent {
    /// Repository root
    Repository(String),
    /// An existing folder
    Folder(Folder),
}

impl FolderParent {
    /// Owning repository id
    #[must_use]
    pub fn repository_id(&self) -> &str {
        match self {
            Self::Repository(id) => id,
            Self::Folder(folder) => &folder.repository_id,
        }
    }
}

/// Registered content type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentType {
    /// Remote id
    pub id: String,
    /// Schema URI the type is bound to
    pub content_type_uri: String,
    /// Display label
    pub label: String,
}

/// Content type schema known to the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTypeSchema {
    /// Schema URI
    pub schema_id: String,
    /// JSON Schema document, as text
    pub body: String,
}

/// Response to a publish start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishStart {
    /// HTTP-like status of the start call
    pub status: u16,
    /// Pollable job location, if the service handed one out
    pub location: Option<String>,
}

impl PublishStart {
    /// Whether the start status signals acceptance
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Remote publish job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishJobState {
    /// Accepted, not started
    Preparing,
    /// Running
    Publishing,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
}

impl PublishJobState {
    /// Whether the job will not change state again
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Repository, folder, record and type operations
#[async_trait::async_trait]
pub trait RepositoryService: Send + Sync {
    /// Every repository on the hub
    async fn list_repositories(&self) -> Result<Vec<Repository>, HubError>;

    /// Every folder in a repository, at any depth
    async fn list_folders(&self, repository_id: &str) -> Result<Vec<Folder>, HubError>;

    /// Parent of a folder; `None` at the repository root
    async fn folder_parent(&self, folder: &Folder) -> Result<Option<Folder>, HubError>;

    /// Direct children of a repository root or folder
    async fn list_subfolders(&self, parent: &FolderParent) -> Result<Vec<Folder>, HubError>;

    /// Create a direct child folder
    async fn create_folder(&self, parent: &FolderParent, name: &str) -> Result<Folder, HubError>;

    /// Fetch a record by remote id
    async fn get_content_item(&self, id: &str) -> Result<ContentRecord, HubError>;

    /// Create a record in a repository (folder taken from `record.folder_id`)
    async fn create_content_item(
        &self,
        repository_id: &str,
        record: &ContentRecord,
    ) -> Result<ContentRecord, HubError>;

    /// Replace body, label and locale of an existing record
    ///
    /// `record.id` names the record; `record.version` is the version the
    /// update is based on.
    async fn update_content_item(&self, record: &ContentRecord) -> Result<ContentRecord, HubError>;

    /// Archive a record
    async fn archive_content_item(&self, id: &str) -> Result<ContentRecord, HubError>;

    /// Unarchive a record
    async fn unarchive_content_item(&self, id: &str) -> Result<ContentRecord, HubError>;

    /// Change the locale of a record
    async fn set_locale(&self, id: &str, locale: &str) -> Result<ContentRecord, HubError>;

    /// Registered content types
    async fn list_content_types(&self) -> Result<Vec<ContentType>, HubError>;

    /// Known content type schemas
    async fn list_content_type_schemas(&self) -> Result<Vec<ContentTypeSchema>, HubError>;

    /// Register a content type bound to `schema_uri`
    async fn register_content_type(
        &self,
        schema_uri: &str,
        label: &str,
    ) -> Result<ContentType, HubError>;

    /// Assign a content type to a repository
    async fn assign_content_type(
        &self,
        repository_id: &str,
        content_type: &ContentType,
    ) -> Result<Repository, HubError>;
}

/// Asynchronous publish jobs
#[async_trait::async_trait]
pub trait PublishService: Send + Sync {
    /// Ask the hub to publish a record
    async fn start_publish(&self, record: &ContentRecord) -> Result<PublishStart, HubError>;

    /// Current state of a publish job
    async fn poll_job(&self, location: &str) -> Result<PublishJobState, HubError>;
}

/// Schema compliance check
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Validator: Send + Sync {
    /// Validation messages for `body`; empty when valid
    async fn validate(&self, body: &Value) -> Vec<String>;
}

/// Operator decision point
#[async_trait::async_trait]
pub trait Confirm: Send + Sync {
    /// Ask a yes/no question
    async fn ask(&self, prompt: &str) -> bool;
}

/// [`Confirm`] backed by a plain function
#[derive(Debug, Clone, Copy)]
pub struct ConfirmFn<F>(pub F);

#[async_trait::async_trait]
impl<F> Confirm for ConfirmFn<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    async fn ask(&self, prompt: &str) -> bool {
        (self.0)(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_matches_name_or_label() {
        let repo = Repository {
            id: "r1".to_string(),
            name: "content".to_string(),
            label: "Main Content".to_string(),
            content_types: vec!["https://example.com/banner.json".to_string()],
        };

        assert!(repo.answers_to("content"));
        assert!(repo.answers_to("Main Content"));
        assert!(!repo.answers_to("slots"));
        assert!(repo.has_content_type("https://example.com/banner.json"));
    }

    #[test]
    fn terminal_states() {
        assert!(PublishJobState::Completed.is_terminal());
        assert!(PublishJobState::Failed.is_terminal());
        assert!(!PublishJobState::Preparing.is_terminal());
        assert!(!PublishJobState::Publishing.is_terminal());
    }

    #[test]
    fn publish_start_status() {
        let ok = PublishStart {
            status: 202,
            location: Some("/jobs/1".to_string()),
        };
        let rejected = PublishStart {
            status: 409,
            location: None,
        };
        assert!(ok.is_success());
        assert!(!rejected.is_success());
    }

    #[tokio::test]
    async fn confirm_fn_forwards_answer() {
        let yes = ConfirmFn(|prompt: &str| prompt.starts_with("create"));
        assert!(yes.ask("create 2 types?").await);
        assert!(!yes.ask("remove 3 records?").await);
    }
}
