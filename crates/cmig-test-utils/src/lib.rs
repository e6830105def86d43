//! Testing utilities for cmig workspace
//!
//! In-memory hub, scripted operator answers and record fixtures.

#![allow(missing_docs)]

use cmig_content::{ContentRecord, ContentStatus, SourceRecord, CONTENT_LINK_SCHEMA};
use cmig_core::{
    Confirm, ContentType, ContentTypeSchema, Folder, FolderParent, HubError, PublishJobState,
    PublishService, PublishStart, Repository, RepositoryService,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const PAGE_SCHEMA: &str = "https://schema.example.com/page.json";
pub const REPO_ID: &str = "repo-1";
pub const REPO_NAME: &str = "content";

/// Link object pointing at `id`
pub fn link(id: &str) -> Value {
    json!({ "_meta": { "schema": CONTENT_LINK_SCHEMA }, "contentType": PAGE_SCHEMA, "id": id })
}

/// Record with `id` whose `links` array references `refs`
pub fn record(id: &str, refs: &[&str]) -> ContentRecord {
    let links: Vec<Value> = refs.iter().map(|r| link(r)).collect();
    ContentRecord::new(
        format!("page {id}"),
        json!({ "_meta": { "schema": PAGE_SCHEMA }, "links": links }),
    )
    .with_id(id)
}

/// Wrap a record as if it was read from `folder_path`
pub fn source(record: ContentRecord, folder_path: &[&str]) -> SourceRecord {
    SourceRecord::detached(record, folder_path.iter().map(|s| s.to_string()).collect())
}

/// Records at the export root
pub fn sources(records: Vec<ContentRecord>) -> Vec<SourceRecord> {
    records.into_iter().map(|r| source(r, &[])).collect()
}

/// Everything the fake hub was asked to change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubCall {
    CreateFolder { name: String, parent: Option<String> },
    CreateItem { label: String, id: String },
    UpdateItem { id: String },
    Unarchive { id: String },
    SetLocale { id: String, locale: String },
    RegisterType { uri: String },
    AssignType { repository_id: String, uri: String },
    StartPublish { id: String },
}

#[derive(Debug)]
struct FakeJob {
    errors_left: u32,
    polls_left: u32,
    fail: bool,
    done: bool,
}

/// In-memory hub
#[derive(Debug, Default)]
pub struct FakeHub {
    repositories: Mutex<Vec<Repository>>,
    folders: Mutex<Vec<(Folder, Option<String>)>>,
    broken_parents: Mutex<HashSet<String>>,
    items: DashMap<String, ContentRecord>,
    types: Mutex<Vec<ContentType>>,
    schemas: Mutex<Vec<ContentTypeSchema>>,
    failing_creates: Mutex<HashSet<String>>,
    failing_folders: Mutex<HashSet<String>>,
    rejected_publishes: Mutex<HashSet<String>>,
    failing_publishes: Mutex<HashSet<String>>,
    unlocated_publishes: Mutex<HashSet<String>>,
    jobs: DashMap<String, FakeJob>,
    calls: Mutex<Vec<HubCall>>,
    next_id: AtomicUsize,
    folder_delay: Option<Duration>,
    publish_polls: u32,
    flaky_polls: u32,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeHub {
    /// Empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Hub with one repository that already has the page type
    pub fn standard() -> Self {
        Self::new()
            .with_repository(REPO_ID, REPO_NAME)
            .with_content_type(PAGE_SCHEMA)
    }

    pub fn with_repository(self, id: &str, name: &str) -> Self {
        self.repositories.lock().push(Repository {
            id: id.to_string(),
            name: name.to_string(),
            label: name.to_uppercase(),
            content_types: Vec::new(),
        });
        self
    }

    /// Accept-all schema, registered type, assigned to every repository so far
    pub fn with_content_type(self, uri: &str) -> Self {
        self.with_content_type_schema(uri, &json!({ "type": "object" }))
    }

    /// Like [`with_content_type`](Self::with_content_type) with a custom schema
    pub fn with_content_type_schema(self, uri: &str, schema: &Value) -> Self {
        let me = self.with_schema(uri, &schema.to_string());
        let id = format!("type-{}", me.types.lock().len() + 1);
        me.types.lock().push(ContentType {
            id,
            content_type_uri: uri.to_string(),
            label: uri.to_string(),
        });
        for repo in me.repositories.lock().iter_mut() {
            repo.content_types.push(uri.to_string());
        }
        me
    }

    /// Schema only, no content type
    pub fn with_schema(self, uri: &str, body: &str) -> Self {
        self.schemas.lock().push(ContentTypeSchema {
            schema_id: uri.to_string(),
            body: body.to_string(),
        });
        self
    }

    /// Registered type not assigned to any repository
    pub fn with_unassigned_type(self, uri: &str) -> Self {
        let me = self.with_schema(uri, &json!({ "type": "object" }).to_string());
        let id = format!("type-{}", me.types.lock().len() + 1);
        me.types.lock().push(ContentType {
            id,
            content_type_uri: uri.to_string(),
            label: uri.to_string(),
        });
        me
    }

    pub fn with_folder(self, id: &str, name: &str, parent: Option<&str>) -> Self {
        self.folders.lock().push((
            Folder {
                id: id.to_string(),
                name: name.to_string(),
                repository_id: REPO_ID.to_string(),
            },
            parent.map(str::to_string),
        ));
        self
    }

    /// Make `folder_parent` fail for a folder
    pub fn with_broken_parent(self, folder_id: &str) -> Self {
        self.broken_parents.lock().insert(folder_id.to_string());
        self
    }

    /// Existing remote record
    pub fn with_item(self, record: ContentRecord) -> Self {
        if let Some(id) = record.id.clone() {
            self.items.insert(id, record);
        }
        self
    }

    /// Folder creation takes this long
    pub fn with_folder_delay(mut self, delay: Duration) -> Self {
        self.folder_delay = Some(delay);
        self
    }

    /// Publish jobs report PUBLISHING this many times before finishing
    pub fn with_publish_polls(mut self, polls: u32) -> Self {
        self.publish_polls = polls;
        self
    }

    /// Creating a record with this label fails
    pub fn fail_create(self, label: &str) -> Self {
        self.failing_creates.lock().insert(label.to_string());
        self
    }

    /// Creating a folder with this name fails
    pub fn fail_folder(self, name: &str) -> Self {
        self.failing_folders.lock().insert(name.to_string());
        self
    }

    /// Publish start for this label is rejected
    pub fn reject_publish(self, label: &str) -> Self {
        self.rejected_publishes.lock().insert(label.to_string());
        self
    }

    /// The first `errors` polls of every job fail before it reports a state
    pub fn with_flaky_polls(mut self, errors: u32) -> Self {
        self.flaky_polls = errors;
        self
    }

    /// Publish start for this label is accepted without a job location
    pub fn omit_location(self, label: &str) -> Self {
        self.unlocated_publishes.lock().insert(label.to_string());
        self
    }

    /// Publish job for this label ends FAILED
    pub fn fail_publish(self, label: &str) -> Self {
        self.failing_publishes.lock().insert(label.to_string());
        self
    }

    pub fn calls(&self) -> Vec<HubCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&HubCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| matches(c)).count()
    }

    pub fn folder_creations(&self) -> usize {
        self.count(|c| matches!(c, HubCall::CreateFolder { .. }))
    }

    pub fn creates(&self) -> usize {
        self.count(|c| matches!(c, HubCall::CreateItem { .. }))
    }

    pub fn updates(&self) -> usize {
        self.count(|c| matches!(c, HubCall::UpdateItem { .. }))
    }

    pub fn publish_starts(&self) -> usize {
        self.count(|c| matches!(c, HubCall::StartPublish { .. }))
    }

    /// Labels in creation order
    pub fn created_labels(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                HubCall::CreateItem { label, .. } => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    /// Remote record by id
    pub fn item(&self, id: &str) -> Option<ContentRecord> {
        self.items.get(id).map(|r| r.clone())
    }

    /// Remote record by label
    pub fn item_by_label(&self, label: &str) -> Option<ContentRecord> {
        self.items
            .iter()
            .find(|r| r.label == label)
            .map(|r| r.value().clone())
    }

    pub fn repository(&self, id: &str) -> Option<Repository> {
        self.repositories.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn log(&self, call: HubCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait::async_trait]
impl RepositoryService for FakeHub {
    async fn list_repositories(&self) -> Result<Vec<Repository>, HubError> {
        Ok(self.repositories.lock().clone())
    }

    async fn list_folders(&self, repository_id: &str) -> Result<Vec<Folder>, HubError> {
        Ok(self
            .folders
            .lock()
            .iter()
            .filter(|(f, _)| f.repository_id == repository_id)
            .map(|(f, _)| f.clone())
            .collect())
    }

    async fn folder_parent(&self, folder: &Folder) -> Result<Option<Folder>, HubError> {
        if self.broken_parents.lock().contains(&folder.id) {
            return Err(HubError::Unavailable(format!("parent of {}", folder.id)));
        }
        let folders = self.folders.lock();
        let parent_id = folders
            .iter()
            .find(|(f, _)| f.id == folder.id)
            .ok_or_else(|| HubError::not_found("folder", folder.id.clone()))?
            .1
            .clone();
        Ok(parent_id.and_then(|id| {
            folders
                .iter()
                .find(|(f, _)| f.id == id)
                .map(|(f, _)| f.clone())
        }))
    }

    async fn list_subfolders(&self, parent: &FolderParent) -> Result<Vec<Folder>, HubError> {
        let parent_id = match parent {
            FolderParent::Repository(_) => None,
            FolderParent::Folder(f) => Some(f.id.clone()),
        };
        Ok(self
            .folders
            .lock()
            .iter()
            .filter(|(f, p)| f.repository_id == parent.repository_id() && *p == parent_id)
            .map(|(f, _)| f.clone())
            .collect())
    }

    async fn create_folder(&self, parent: &FolderParent, name: &str) -> Result<Folder, HubError> {
        if let Some(delay) = self.folder_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_folders.lock().contains(name) {
            return Err(HubError::Rejected {
                status: 400,
                message: format!("cannot create folder {name}"),
            });
        }
        let parent_id = match parent {
            FolderParent::Repository(_) => None,
            FolderParent::Folder(f) => Some(f.id.clone()),
        };
        let folder = Folder {
            id: self.next_id("folder"),
            name: name.to_string(),
            repository_id: parent.repository_id().to_string(),
        };
        self.folders.lock().push((folder.clone(), parent_id.clone()));
        self.log(HubCall::CreateFolder {
            name: name.to_string(),
            parent: parent_id,
        });
        Ok(folder)
    }

    async fn get_content_item(&self, id: &str) -> Result<ContentRecord, HubError> {
        self.item(id)
            .ok_or_else(|| HubError::not_found("content item", id))
    }

    async fn create_content_item(
        &self,
        repository_id: &str,
        record: &ContentRecord,
    ) -> Result<ContentRecord, HubError> {
        if self.failing_creates.lock().contains(&record.label) {
            return Err(HubError::Rejected {
                status: 400,
                message: format!("cannot create {}", record.label),
            });
        }

        let mut created = record.clone();
        let id = self.next_id("item");
        created.id = Some(id.clone());
        created.repository_id = Some(repository_id.to_string());
        created.version = Some(1);
        created.locale = None;
        created.status = ContentStatus::Active;
        self.items.insert(id.clone(), created.clone());
        self.log(HubCall::CreateItem {
            label: record.label.clone(),
            id,
        });
        Ok(created)
    }

    async fn update_content_item(&self, record: &ContentRecord) -> Result<ContentRecord, HubError> {
        let id = record
            .id
            .clone()
            .ok_or_else(|| HubError::not_found("content item", "(none)"))?;
        let mut stored = self
            .items
            .get_mut(&id)
            .ok_or_else(|| HubError::not_found("content item", id.clone()))?;
        if stored.is_archived() {
            return Err(HubError::Rejected {
                status: 409,
                message: format!("{id} is archived"),
            });
        }

        if stored.body != record.body || stored.label != record.label || stored.locale != record.locale
        {
            stored.body = record.body.clone();
            stored.label = record.label.clone();
            stored.locale = record.locale.clone();
            stored.version = Some(stored.version.unwrap_or(0) + 1);
        }
        let updated = stored.clone();
        drop(stored);

        self.log(HubCall::UpdateItem { id });
        Ok(updated)
    }

    async fn archive_content_item(&self, id: &str) -> Result<ContentRecord, HubError> {
        let mut stored = self
            .items
            .get_mut(id)
            .ok_or_else(|| HubError::not_found("content item", id))?;
        stored.status = ContentStatus::Archived;
        Ok(stored.clone())
    }

    async fn unarchive_content_item(&self, id: &str) -> Result<ContentRecord, HubError> {
        let updated = {
            let mut stored = self
                .items
                .get_mut(id)
                .ok_or_else(|| HubError::not_found("content item", id))?;
            stored.status = ContentStatus::Active;
            stored.clone()
        };
        self.log(HubCall::Unarchive { id: id.to_string() });
        Ok(updated)
    }

    async fn set_locale(&self, id: &str, locale: &str) -> Result<ContentRecord, HubError> {
        let updated = {
            let mut stored = self
                .items
                .get_mut(id)
                .ok_or_else(|| HubError::not_found("content item", id))?;
            stored.locale = Some(locale.to_string());
            stored.clone()
        };
        self.log(HubCall::SetLocale {
            id: id.to_string(),
            locale: locale.to_string(),
        });
        Ok(updated)
    }

    async fn list_content_types(&self) -> Result<Vec<ContentType>, HubError> {
        Ok(self.types.lock().clone())
    }

    async fn list_content_type_schemas(&self) -> Result<Vec<ContentTypeSchema>, HubError> {
        Ok(self.schemas.lock().clone())
    }

    async fn register_content_type(
        &self,
        schema_uri: &str,
        label: &str,
    ) -> Result<ContentType, HubError> {
        let content_type = ContentType {
            id: self.next_id("type"),
            content_type_uri: schema_uri.to_string(),
            label: label.to_string(),
        };
        self.types.lock().push(content_type.clone());
        self.log(HubCall::RegisterType {
            uri: schema_uri.to_string(),
        });
        Ok(content_type)
    }

    async fn assign_content_type(
        &self,
        repository_id: &str,
        content_type: &ContentType,
    ) -> Result<Repository, HubError> {
        let repository = {
            let mut repositories = self.repositories.lock();
            let repository = repositories
                .iter_mut()
                .find(|r| r.id == repository_id)
                .ok_or_else(|| HubError::not_found("repository", repository_id))?;
            repository
                .content_types
                .push(content_type.content_type_uri.clone());
            repository.clone()
        };
        self.log(HubCall::AssignType {
            repository_id: repository_id.to_string(),
            uri: content_type.content_type_uri.clone(),
        });
        Ok(repository)
    }
}

#[async_trait::async_trait]
impl PublishService for FakeHub {
    async fn start_publish(&self, record: &ContentRecord) -> Result<PublishStart, HubError> {
        let id = record.id.clone().unwrap_or_default();
        self.log(HubCall::StartPublish { id: id.clone() });

        if self.rejected_publishes.lock().contains(&record.label) {
            return Ok(PublishStart {
                status: 500,
                location: None,
            });
        }

        if self.unlocated_publishes.lock().contains(&record.label) {
            return Ok(PublishStart {
                status: 202,
                location: None,
            });
        }

        let location = format!("/jobs/{}", self.next_id("job"));
        self.jobs.insert(
            location.clone(),
            FakeJob {
                errors_left: self.flaky_polls,
                polls_left: self.publish_polls,
                fail: self.failing_publishes.lock().contains(&record.label),
                done: false,
            },
        );
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        Ok(PublishStart {
            status: 202,
            location: Some(location),
        })
    }

    async fn poll_job(&self, location: &str) -> Result<PublishJobState, HubError> {
        let mut job = self
            .jobs
            .get_mut(location)
            .ok_or_else(|| HubError::not_found("publish job", location))?;

        if job.errors_left > 0 {
            job.errors_left -= 1;
            return Err(HubError::Unavailable(format!("{location} timed out")));
        }
        if job.polls_left > 0 {
            job.polls_left -= 1;
            return Ok(PublishJobState::Publishing);
        }
        if !job.done {
            job.done = true;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(if job.fail {
            PublishJobState::Failed
        } else {
            PublishJobState::Completed
        })
    }
}

/// Operator with pre-recorded answers
#[derive(Debug)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    fallback: bool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    /// Answers in order, then `false`
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            fallback: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Same answer every time
    pub fn always(answer: bool) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            fallback: answer,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn asked(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait::async_trait]
impl Confirm for ScriptedConfirm {
    async fn ask(&self, prompt: &str) -> bool {
        self.prompts.lock().push(prompt.to_string());
        self.answers.lock().pop_front().unwrap_or(self.fallback)
    }
}
