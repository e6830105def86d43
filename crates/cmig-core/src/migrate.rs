//! Migration orchestrator
//!
//! One run, in order:
//! 1. place records under their target repository and folder path
//! 2. ask before updating records the mapping already knows
//! 3. register and assign missing content types
//! 4. drop unmigratable records, then skip or null dangling references
//! 5. create or update level by level, rewriting references through the mapping
//! 6. resolve the circular set in two passes
//! 7. publish eligible records that no eligible dependant already covers
//!
//! The mapping is saved after step 6, also when a record or a gate failed
//! after something was registered. A validate-only run reports the types
//! it would register and assign without touching the hub.

use crate::config::MigrationConfig;
use crate::error::{HubError, MigrateError};
use crate::folders::{FolderCache, FolderPlacement};
use crate::gate::ConfirmationGate;
use crate::hub::{
    Confirm, ContentType, ContentTypeSchema, Folder, PublishService, Repository,
    RepositoryService, Validator,
};
use crate::mapping::MappingStore;
use crate::prune;
use crate::publish::PublishQueue;
use crate::report::{
    MigrationReport, NulledReference, PendingAssignment, RecordAction, ValidationIssue,
};
use crate::schema::SchemaValidator;
use cmig_content::{
    load_export, ContentRecord, ContentStatus, DependencyScanner, SourceRecord,
};
use cmig_graph::{DependencyGraph, GraphBuilder, GraphItem, NodeId};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

/// Where an export is imported to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// Directory paths become folder paths under the repository root
    Repository(String),
    /// Directory paths become folder paths under an existing folder
    Folder {
        repository_id: String,
        folder_id: String,
    },
    /// The first directory names the repository (by name or label); the
    /// rest is the folder path under its root
    Hub,
}

#[derive(Debug, Clone)]
struct ImportItem {
    source: SourceRecord,
    base: FolderPlacement,
    folder_path: Vec<String>,
}

impl GraphItem for ImportItem {
    fn record(&self) -> &ContentRecord {
        &self.source.record
    }

    fn record_mut(&mut self) -> &mut ContentRecord {
        &mut self.source.record
    }
}

/// A record ready to be sent, references already rewritten
#[derive(Debug)]
struct Prepared {
    node: NodeId,
    record: ContentRecord,
    source_id: Option<String>,
    existing: Option<String>,
    base: FolderPlacement,
    folder_path: Vec<String>,
}

/// A record the hub accepted
#[derive(Debug, Clone)]
struct Applied {
    node: NodeId,
    label: String,
    source_id: Option<String>,
    remote: ContentRecord,
    action: RecordAction,
    changed: bool,
    publishable: bool,
}

/// Created records waiting for the publish step
struct Staged {
    graph: DependencyGraph<ImportItem>,
    candidates: Vec<Applied>,
}

impl Applied {
    fn verb(&self) -> &'static str {
        match self.action {
            RecordAction::Created => "Created",
            RecordAction::Updated { .. } => "Updated",
            RecordAction::Unchanged => "Unchanged",
            RecordAction::Skipped { .. } => "Skipped",
        }
    }
}

fn type_label(schema_uri: &str) -> String {
    schema_uri
        .rsplit('/')
        .next()
        .map(|last| last.trim_end_matches(".json"))
        .filter(|last| !last.is_empty())
        .unwrap_or(schema_uri)
        .to_string()
}

fn label_list<'a>(labels: impl Iterator<Item = &'a str>) -> String {
    labels.collect::<Vec<_>>().join(", ")
}

/// Content migration engine
pub struct Migrator {
    hub: Arc<dyn RepositoryService>,
    publisher: Option<Arc<dyn PublishService>>,
    validator: Option<Arc<dyn Validator>>,
    confirm: Option<Arc<dyn Confirm>>,
    config: MigrationConfig,
    builder: GraphBuilder,
}

impl Migrator {
    /// Migrator writing to `hub`
    #[must_use]
    pub fn new(hub: Arc<dyn RepositoryService>, config: MigrationConfig) -> Self {
        Self {
            hub,
            publisher: None,
            validator: None,
            confirm: None,
            config,
            builder: GraphBuilder::new(),
        }
    }

    /// With a publish service
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn PublishService>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// With a validator (defaults to the hub's JSON schemas)
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// With an operator to ask at confirmation gates
    #[must_use]
    pub fn with_confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = Some(confirm);
        self
    }

    /// With a custom reference scanner
    #[must_use]
    pub fn with_scanner(mut self, scanner: DependencyScanner) -> Self {
        self.builder = GraphBuilder::new().with_scanner(scanner);
        self
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Load an export directory and migrate it
    ///
    /// Unreadable files are logged as skipped and do not stop the run.
    ///
    /// # Errors
    /// As [`run`](Self::run), plus `MigrateError::Load` if `dir` cannot be listed.
    pub async fn run_export(
        &self,
        target: &ImportTarget,
        dir: impl AsRef<Path>,
        mapping: &mut MappingStore,
    ) -> Result<MigrationReport, MigrateError> {
        let export = load_export(dir).await?;
        for skipped in &export.skipped {
            tracing::warn!("Skipped unreadable record: {}", skipped);
        }

        let mut report = self.run(target, export.records, mapping).await?;
        for skipped in export.skipped {
            report.push(
                "unreadable file",
                None,
                None,
                RecordAction::Skipped {
                    reason: skipped.to_string(),
                },
            );
        }
        Ok(report)
    }

    /// Migrate a batch of records
    ///
    /// # Errors
    /// - `MigrateError::Declined` if the operator says no at a gate
    /// - `MigrateError::UnknownRepository` if a record has no target repository
    /// - `MigrateError::RecordFailed` if the hub rejects a record (records
    ///   created before the failure stay created and mapped)
    /// - `MigrateError::Hub` if the hub cannot be listed
    pub async fn run(
        &self,
        target: &ImportTarget,
        records: Vec<SourceRecord>,
        mapping: &mut MappingStore,
    ) -> Result<MigrationReport, MigrateError> {
        self.config.validate()?;
        let mut report = MigrationReport::new();

        tracing::info!("Migrating {} records", records.len());
        let staged = self.stage(target, records, mapping, &mut report).await;
        if mapping.has_changes() {
            if let Err(e) = mapping.save().await {
                tracing::error!("Could not save mapping: {}", e);
                if staged.is_ok() {
                    return Err(e.into());
                }
            }
        }

        if let Some(staged) = staged? {
            if self.config.publish {
                self.publish(&staged.graph, staged.candidates, &mut report)
                    .await;
            }
        }

        report.finish();
        tracing::info!("Migration finished: {}", report.summary());
        Ok(report)
    }

    /// Everything up to and including creation; `None` for validate-only runs
    async fn stage(
        &self,
        target: &ImportTarget,
        records: Vec<SourceRecord>,
        mapping: &mut MappingStore,
        report: &mut MigrationReport,
    ) -> Result<Option<Staged>, MigrateError> {
        let gate = ConfirmationGate::new(self.confirm.clone(), self.config.force);
        let repositories = self.hub.list_repositories().await?;
        let mut items = self.place(target, &repositories, records)?;

        if self.config.exclude_delivery_keys {
            for item in &mut items {
                if item.source.record.strip_delivery_key().is_some() {
                    tracing::debug!("Removed delivery key from {}", item.source.record.describe());
                }
            }
        }

        self.check_conflicts(&gate, &mut items, mapping, report)
            .await;

        let schemas = self.hub.list_content_type_schemas().await?;
        let types = self
            .preflight_types(&gate, &items, &repositories, &schemas, mapping, report)
            .await?;

        let validator: Arc<dyn Validator> = match &self.validator {
            Some(validator) => Arc::clone(validator),
            None => Arc::new(SchemaValidator::from_catalog(&schemas)),
        };

        let items = self
            .validate_dependencies(&gate, items, &types, validator.as_ref(), mapping, report)
            .await?;

        let graph = self
            .builder
            .build(items, |id| mapping.has_content_item(id));
        report.levels = graph.levels().len();
        report.circular = graph.circular().len();
        tracing::info!(
            "Planned {} levels, {} circular records",
            report.levels,
            report.circular
        );

        if self.config.validate_only {
            self.validate_only(&graph, validator.as_ref(), report).await;
            return Ok(None);
        }

        let folders = FolderCache::new(Arc::clone(&self.hub));
        let roots: BTreeSet<&str> = graph
            .nodes()
            .iter()
            .filter(|node| node.item.base.folder.is_none())
            .map(|node| node.item.base.repository_id.as_str())
            .collect();
        for repository_id in roots {
            if let Err(e) = folders.prime(repository_id).await {
                tracing::warn!("Could not list folders of {}: {}", repository_id, e);
            }
        }

        let candidates = self.create_all(&graph, &folders, mapping, report).await?;
        Ok(Some(Staged { graph, candidates }))
    }

    fn place(
        &self,
        target: &ImportTarget,
        repositories: &[Repository],
        records: Vec<SourceRecord>,
    ) -> Result<Vec<ImportItem>, MigrateError> {
        let known = |id: &str| -> Result<(), MigrateError> {
            if repositories.iter().any(|r| r.id == id) {
                Ok(())
            } else {
                Err(MigrateError::UnknownRepository(id.to_string()))
            }
        };

        let fixed = match target {
            ImportTarget::Repository(repository_id) => {
                known(repository_id)?;
                Some(FolderPlacement::root(repository_id.clone()))
            }
            ImportTarget::Folder {
                repository_id,
                folder_id,
            } => {
                known(repository_id)?;
                Some(FolderPlacement::in_folder(Folder {
                    id: folder_id.clone(),
                    name: String::new(),
                    repository_id: repository_id.clone(),
                }))
            }
            ImportTarget::Hub => None,
        };

        records
            .into_iter()
            .map(|source| {
                let (base, folder_path) = match &fixed {
                    Some(base) => (base.clone(), source.folder_path.clone()),
                    None => {
                        let (first, rest) = source.folder_path.split_first().ok_or_else(|| {
                            MigrateError::UnknownRepository(format!(
                                "(none) for '{}'",
                                source.record.label
                            ))
                        })?;
                        let repository = repositories
                            .iter()
                            .find(|r| r.answers_to(first))
                            .ok_or_else(|| MigrateError::UnknownRepository(first.clone()))?;
                        (FolderPlacement::root(repository.id.clone()), rest.to_vec())
                    }
                };
                Ok(ImportItem {
                    source,
                    base,
                    folder_path,
                })
            })
            .collect()
    }

    async fn check_conflicts(
        &self,
        gate: &ConfirmationGate,
        items: &mut Vec<ImportItem>,
        mapping: &MappingStore,
        report: &mut MigrationReport,
    ) {
        let is_known = |item: &ImportItem| {
            item.record()
                .id
                .as_deref()
                .is_some_and(|id| mapping.has_content_item(id))
        };
        let known = items.iter().filter(|&item| is_known(item)).count();
        if known == 0 {
            return;
        }

        let prompt = format!(
            "{known} of {} records were migrated before. Update them?",
            items.len()
        );
        if gate.ask(&prompt).await {
            return;
        }

        items.retain(|item| {
            if is_known(item) {
                report.push(
                    item.record().label.clone(),
                    item.record().id.clone(),
                    None,
                    RecordAction::Skipped {
                        reason: "already migrated; update declined".to_string(),
                    },
                );
                false
            } else {
                true
            }
        });
    }

    async fn preflight_types(
        &self,
        gate: &ConfirmationGate,
        items: &[ImportItem],
        repositories: &[Repository],
        schemas: &[ContentTypeSchema],
        mapping: &mut MappingStore,
        report: &mut MigrationReport,
    ) -> Result<Vec<ContentType>, MigrateError> {
        let mut types = self.hub.list_content_types().await?;
        let required: BTreeSet<&str> = items.iter().filter_map(|i| i.record().schema()).collect();
        let registrable: Vec<&str> = required
            .iter()
            .copied()
            .filter(|&uri| !types.iter().any(|t| t.content_type_uri == uri))
            .filter(|&uri| schemas.iter().any(|s| s.schema_id == uri))
            .collect();

        if self.config.validate_only {
            for uri in registrable {
                tracing::info!("Would register a content type for {}", uri);
                report.pending_registrations.push(uri.to_string());
                types.push(ContentType {
                    id: String::new(),
                    content_type_uri: uri.to_string(),
                    label: type_label(uri),
                });
            }
        } else if !registrable.is_empty() {
            let prompt = format!(
                "{} schemas have no content type ({}). Register them?",
                registrable.len(),
                label_list(registrable.iter().copied())
            );
            gate.require("content type registration", &prompt).await?;

            for uri in registrable {
                let content_type = self
                    .hub
                    .register_content_type(uri, &type_label(uri))
                    .await?;
                tracing::info!("Registered content type {} for {}", content_type.id, uri);
                mapping.register_content_type(uri, &content_type.id);
                types.push(content_type);
            }
        }

        let mut per_repository: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for item in items {
            if let Some(schema) = item.record().schema() {
                per_repository
                    .entry(item.base.repository_id.as_str())
                    .or_default()
                    .insert(schema);
            }
        }

        let mut to_assign: Vec<(&str, &ContentType)> = Vec::new();
        for (repository_id, uris) in &per_repository {
            let Some(repository) = repositories.iter().find(|r| r.id == *repository_id) else {
                continue;
            };
            for uri in uris {
                if repository.has_content_type(uri) {
                    continue;
                }
                if let Some(content_type) = types.iter().find(|t| t.content_type_uri == *uri) {
                    to_assign.push((*repository_id, content_type));
                }
            }
        }

        if self.config.validate_only {
            for (repository_id, content_type) in &to_assign {
                tracing::info!("Would assign {} to {}", content_type.label, repository_id);
                report.pending_assignments.push(PendingAssignment {
                    repository_id: repository_id.to_string(),
                    content_type_uri: content_type.content_type_uri.clone(),
                });
            }
        } else if !to_assign.is_empty() {
            let prompt = format!(
                "{} content types are not assigned to their target repository ({}). Assign them?",
                to_assign.len(),
                label_list(to_assign.iter().map(|(_, t)| t.label.as_str()))
            );
            gate.require("content type assignment", &prompt).await?;

            for (repository_id, content_type) in &to_assign {
                self.hub
                    .assign_content_type(repository_id, content_type)
                    .await?;
                tracing::info!("Assigned {} to {}", content_type.label, repository_id);
            }
        }

        Ok(types)
    }

    async fn validate_dependencies(
        &self,
        gate: &ConfirmationGate,
        items: Vec<ImportItem>,
        types: &[ContentType],
        validator: &dyn Validator,
        mapping: &MappingStore,
        report: &mut MigrationReport,
    ) -> Result<Vec<ImportItem>, MigrateError> {
        let mut graph = self.builder.scan(items);
        let mut dropped: BTreeMap<NodeId, String> = BTreeMap::new();

        let unmigratable = prune::unmigratable(&graph, |uri| {
            types.iter().any(|t| t.content_type_uri == uri)
        });
        if !unmigratable.is_empty() {
            let prompt = format!(
                "{} records cannot be migrated (missing schema, or depending on such a record). Skip them?",
                unmigratable.len()
            );
            gate.require("removal of unmigratable records", &prompt)
                .await?;
            dropped.extend(unmigratable);
        }

        let excluded: BTreeSet<NodeId> = dropped.keys().copied().collect();
        let dangling = prune::dangling(&graph, &excluded, |id| mapping.has_content_item(id));

        if !dangling.is_empty() {
            let labels = label_list(
                dangling
                    .keys()
                    .map(|&id| graph.node(id).record().label.as_str()),
            );

            if self.config.skip_incomplete {
                let prompt = format!(
                    "{} records reference content that does not exist ({labels}). Skip them?",
                    dangling.len()
                );
                gate.require("skipping incomplete records", &prompt)
                    .await?;
                self.drop_with_dependants(&graph, dangling.keys().copied(), "missing reference", &mut dropped);
            } else {
                let prompt = format!(
                    "{} records reference content that does not exist ({labels}). Null those references?",
                    dangling.len()
                );
                gate.require("nulling missing references", &prompt)
                    .await?;

                let plan = prune::plan_nulling(&graph, &dangling, validator).await?;
                for (id, issues) in &plan.rejected {
                    tracing::warn!(
                        "{} would break its schema with references nulled; skipping it: {}",
                        graph.node(*id).record().describe(),
                        issues.join("; ")
                    );
                }
                self.drop_with_dependants(
                    &graph,
                    plan.rejected.iter().map(|(id, _)| *id),
                    "nulling missing references breaks its schema",
                    &mut dropped,
                );

                for (id, body) in plan.nullable {
                    if dropped.contains_key(&id) {
                        continue;
                    }
                    let record = graph.node(id).record().clone();
                    for dependency in dangling.get(&id).into_iter().flatten() {
                        tracing::warn!(
                            "Nulled reference {} at {} in {}",
                            dependency.target_id,
                            dependency.pointer,
                            record.describe()
                        );
                        report.nulled.push(NulledReference {
                            label: record.label.clone(),
                            source_id: record.id.clone(),
                            pointer: dependency.pointer.clone(),
                            target_id: dependency.target_id.clone(),
                        });
                    }
                    graph.node_mut(id).item.source.record.body = body;
                }
            }
        }

        for (&id, reason) in &dropped {
            let record = graph.node(id).record();
            tracing::warn!("Skipping {}: {}", record.describe(), reason);
            report.push(
                record.label.clone(),
                record.id.clone(),
                None,
                RecordAction::Skipped {
                    reason: reason.clone(),
                },
            );
        }

        Ok(graph
            .into_items()
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !dropped.contains_key(&NodeId(*index)))
            .map(|(_, item)| item)
            .collect())
    }

    fn drop_with_dependants(
        &self,
        graph: &DependencyGraph<ImportItem>,
        seeds: impl Iterator<Item = NodeId>,
        reason: &str,
        dropped: &mut BTreeMap<NodeId, String>,
    ) {
        let seeds: Vec<NodeId> = seeds.collect();
        for &seed in &seeds {
            dropped.entry(seed).or_insert_with(|| reason.to_string());
        }
        for id in prune::with_dependants(graph, seeds.iter().copied()) {
            dropped.entry(id).or_insert_with(|| {
                format!("depends on a record skipped for {reason}")
            });
        }
    }

    async fn validate_only(
        &self,
        graph: &DependencyGraph<ImportItem>,
        validator: &dyn Validator,
        report: &mut MigrationReport,
    ) {
        for node in graph.nodes() {
            let record = node.record();
            let messages = validator.validate(&record.body).await;
            if messages.is_empty() {
                continue;
            }
            tracing::warn!("{} fails validation: {}", record.describe(), messages.join("; "));
            report.validation.push(ValidationIssue {
                label: record.label.clone(),
                source_id: record.id.clone(),
                messages,
            });
        }
        tracing::info!(
            "Validated {} records, {} with issues",
            graph.len(),
            report.validation.len()
        );
    }

    /// Levels, then the circular set; returns publish candidates
    async fn create_all(
        &self,
        graph: &DependencyGraph<ImportItem>,
        folders: &FolderCache,
        mapping: &mut MappingStore,
        report: &mut MigrationReport,
    ) -> Result<Vec<Applied>, MigrateError> {
        let mut candidates = Vec::new();

        for (index, level) in graph.levels().iter().enumerate() {
            tracing::info!("Level {} ({} records)", index + 1, level.len());
            let jobs = level
                .nodes
                .iter()
                .map(|&id| self.prepare(graph, id, mapping, false))
                .collect::<Result<Vec<_>, _>>()?;

            let applied = self.apply_all(jobs, folders, mapping).await?;
            for done in applied {
                Self::log_outcome(report, &done);
                candidates.push(done);
            }
        }

        if !graph.circular().is_empty() {
            candidates.extend(self.resolve_circular(graph, folders, mapping, report).await?);
        }

        Ok(candidates
            .into_iter()
            .filter(|done| done.publishable && (done.changed || self.config.republish))
            .collect())
    }

    async fn resolve_circular(
        &self,
        graph: &DependencyGraph<ImportItem>,
        folders: &FolderCache,
        mapping: &mut MappingStore,
        report: &mut MigrationReport,
    ) -> Result<Vec<Applied>, MigrateError> {
        let circular = graph.circular();
        tracing::info!("Resolving {} circular records", circular.len());

        let mut first_pass: BTreeMap<NodeId, Applied> = BTreeMap::new();
        for &id in circular {
            let job = self.prepare(graph, id, mapping, true)?;
            for done in self.apply_all(vec![job], folders, mapping).await? {
                first_pass.insert(done.node, done);
            }
        }

        let jobs = circular
            .iter()
            .map(|&id| {
                let mut job = self.prepare(graph, id, mapping, false)?;
                // records without a source id have no mapping entry to find
                if let Some(remote_id) = first_pass.get(&id).and_then(|d| d.remote.id.clone()) {
                    job.existing = Some(remote_id);
                }
                Ok(job)
            })
            .collect::<Result<Vec<_>, MigrateError>>()?;
        let second_pass = self.apply_all(jobs, folders, mapping).await?;

        Ok(second_pass
            .into_iter()
            .map(|mut done| {
                if let Some(first) = first_pass.get(&done.node) {
                    done.changed |= first.changed;
                    if first.action == RecordAction::Created {
                        done.action = RecordAction::Created;
                    }
                }
                Self::log_outcome(report, &done);
                done
            })
            .collect())
    }

    fn prepare(
        &self,
        graph: &DependencyGraph<ImportItem>,
        id: NodeId,
        mapping: &MappingStore,
        null_unresolved: bool,
    ) -> Result<Prepared, MigrateError> {
        let node = graph.node(id);
        let mut record = node.record().clone();

        for resolved in &node.dependencies {
            let target = resolved.dependency.target_id.as_str();
            match mapping.content_item(target) {
                Some(new_id) => {
                    let mut dependency = resolved.dependency.clone();
                    dependency.rewrite(&mut record.body, new_id)?;
                }
                None if null_unresolved => {
                    tracing::debug!(
                        "Temporarily nulling {} at {} in {}",
                        target,
                        resolved.dependency.pointer,
                        record.describe()
                    );
                    resolved.dependency.null_out(&mut record.body)?;
                }
                None => {
                    tracing::debug!("Reference {} in {} is unresolved", target, record.describe());
                }
            }
        }

        let source_id = record.id.clone();
        let existing = source_id
            .as_deref()
            .and_then(|old| mapping.content_item(old))
            .map(str::to_string);

        Ok(Prepared {
            node: id,
            record,
            source_id,
            existing,
            base: node.item.base.clone(),
            folder_path: node.item.folder_path.clone(),
        })
    }

    /// Send a batch concurrently and register every accepted record
    ///
    /// All sends settle before the first failure (if any) is returned, so
    /// the mapping holds every record the hub accepted.
    async fn apply_all(
        &self,
        jobs: Vec<Prepared>,
        folders: &FolderCache,
        mapping: &mut MappingStore,
    ) -> Result<Vec<Applied>, MigrateError> {
        let results: Vec<Result<Applied, MigrateError>> = stream::iter(jobs)
            .map(|job| self.apply(job, folders))
            .buffer_unordered(self.config.create_concurrency)
            .collect()
            .await;

        let mut applied = Vec::with_capacity(results.len());
        let mut failure = None;
        for result in results {
            match result {
                Ok(done) => applied.push(done),
                Err(e) => {
                    tracing::error!("{}", e);
                    failure.get_or_insert(e);
                }
            }
        }
        applied.sort_by_key(|done| done.node);

        for done in &applied {
            if let (Some(old), Some(new)) = (done.source_id.as_deref(), done.remote.id.as_deref()) {
                mapping.register_content_item(old, new);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(applied),
        }
    }

    async fn apply(&self, job: Prepared, folders: &FolderCache) -> Result<Applied, MigrateError> {
        let Prepared {
            node,
            mut record,
            source_id,
            existing,
            base,
            folder_path,
        } = job;
        let publishable = record.was_published();
        let label = record.label.clone();
        let failed = |action: &'static str| {
            let label = label.clone();
            move |source: HubError| MigrateError::RecordFailed {
                action,
                label,
                source,
            }
        };

        if let Some(new_id) = existing {
            match self.hub.get_content_item(&new_id).await {
                Ok(remote) => {
                    let mut current = remote;
                    if current.is_archived() {
                        current = self
                            .hub
                            .unarchive_content_item(&new_id)
                            .await
                            .map_err(failed("unarchive"))?;
                    }

                    record.id = Some(new_id);
                    record.version = current.version;
                    record.repository_id = current.repository_id.clone();
                    record.folder_id = current.folder_id.clone();
                    record.status = ContentStatus::Active;

                    let updated = self
                        .hub
                        .update_content_item(&record)
                        .await
                        .map_err(failed("update"))?;
                    let changed = updated.version != current.version;
                    let action = if changed {
                        RecordAction::Updated {
                            from: current.version,
                            to: updated.version,
                        }
                    } else {
                        RecordAction::Unchanged
                    };

                    return Ok(Applied {
                        node,
                        label,
                        source_id,
                        remote: updated,
                        action,
                        changed,
                        publishable,
                    });
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(
                        "{} was mapped to {}, which no longer exists; creating it again",
                        label,
                        new_id
                    );
                }
                Err(e) => return Err(failed("fetch")(e)),
            }
        }

        let placement = folders.resolve_or_root(&base, &folder_path).await;
        record.id = None;
        record.version = None;
        record.status = ContentStatus::Active;
        record.repository_id = Some(placement.repository_id.clone());
        record.folder_id = placement.folder_id().map(str::to_string);

        let mut created = self
            .hub
            .create_content_item(&placement.repository_id, &record)
            .await
            .map_err(failed("create"))?;

        if let Some(locale) = record.locale.as_deref() {
            if created.locale.as_deref() != Some(locale) {
                if let Some(created_id) = created.id.clone() {
                    created = self
                        .hub
                        .set_locale(&created_id, locale)
                        .await
                        .map_err(failed("set locale of"))?;
                }
            }
        }

        Ok(Applied {
            node,
            label,
            source_id,
            remote: created,
            action: RecordAction::Created,
            changed: true,
            publishable,
        })
    }

    fn log_outcome(report: &mut MigrationReport, done: &Applied) {
        tracing::info!(
            "{} {} -> {}",
            done.verb(),
            done.label,
            done.remote.id.as_deref().unwrap_or("?")
        );
        report.push(
            done.label.clone(),
            done.source_id.clone(),
            done.remote.id.clone(),
            done.action.clone(),
        );
    }

    async fn publish(
        &self,
        graph: &DependencyGraph<ImportItem>,
        candidates: Vec<Applied>,
        report: &mut MigrationReport,
    ) {
        let Some(publisher) = &self.publisher else {
            tracing::warn!("Publishing requested but no publish service is configured");
            return;
        };

        let to_publish = covered_by_dependants(graph, candidates);
        tracing::info!("Publishing {} records", to_publish.len());

        let queue = PublishQueue::new(Arc::clone(publisher), self.config.publish_queue);
        for done in &to_publish {
            if let Err(e) = queue.submit(&done.remote).await {
                tracing::debug!("Publish of {} not started: {}", done.label, e);
            }
        }
        report.publish = queue.drain().await;
    }
}

/// Drop candidates that an eligible dependant will publish along with it
///
/// Only non-hierarchy edges cascade. Within a cycle of eligible records the
/// first in batch order is kept.
fn covered_by_dependants(
    graph: &DependencyGraph<ImportItem>,
    candidates: Vec<Applied>,
) -> Vec<Applied> {
    let eligible: BTreeSet<NodeId> = candidates.iter().map(|done| done.node).collect();
    let reach: BTreeMap<NodeId, BTreeSet<NodeId>> = eligible
        .iter()
        .map(|&id| {
            (
                id,
                graph.dependant_closure(id, |d| !d.dependency.kind.is_hierarchy()),
            )
        })
        .collect();
    let reaches = |from: NodeId, to: NodeId| reach.get(&from).is_some_and(|set| set.contains(&to));

    candidates
        .into_iter()
        .filter(|done| {
            let x = done.node;
            let covered = eligible
                .iter()
                .any(|&y| y != x && reaches(x, y) && (!reaches(y, x) || y < x));
            if covered {
                tracing::debug!("{} is published through a dependant", done.label);
            }
            !covered
        })
        .collect()
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("config", &self.config)
            .field("publisher", &self.publisher.is_some())
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}
