//! cmig core - content migration orchestrator
//!
//! Moves a batch of content records to a hub while keeping their references
//! intact:
//! - Places records under their repository and folder path
//! - Creates records level by level so references always point at created ids
//! - Resolves reference cycles in two passes
//! - Persists an old-id → new-id mapping so re-runs update instead of duplicating
//! - Publishes eligible records through a bounded job queue
//!
//! # Example
//!
//! ```rust,ignore
//! use cmig_core::{ImportTarget, MappingStore, MigrationConfig, Migrator};
//! use std::sync::Arc;
//!
//! # async fn example(hub: Arc<dyn cmig_core::RepositoryService>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut mapping = MappingStore::load("mapping.json").await;
//! let migrator = Migrator::new(hub, MigrationConfig::new().with_force(true));
//!
//! let target = ImportTarget::Repository("repo-1".to_string());
//! let report = migrator.run_export(&target, "./export", &mut mapping).await?;
//!
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod folders;
pub mod gate;
pub mod hub;
pub mod mapping;
pub mod migrate;
pub mod prune;
pub mod publish;
pub mod report;
pub mod schema;

pub use config::{MigrationConfig, PublishQueueConfig};
pub use error::{HubError, MappingError, MigrateError, PublishError};
pub use folders::{FolderCache, FolderPlacement};
pub use gate::ConfirmationGate;
pub use hub::{
    Confirm, ConfirmFn, ContentType, ContentTypeSchema, Folder, FolderParent, PublishJobState,
    PublishService, PublishStart, Repository, RepositoryService, Validator,
};
pub use mapping::MappingStore;
pub use migrate::{ImportTarget, Migrator};
pub use publish::{PublishFailure, PublishQueue, PublishReport, PublishedRecord};
pub use report::{
    MigrationReport, NulledReference, PendingAssignment, RecordAction, RecordOutcome,
    ValidationIssue,
};
pub use schema::SchemaValidator;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
