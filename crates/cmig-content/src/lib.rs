//! cmig content model
//!
//! Content records as moved between hubs:
//! - [`ContentRecord`]: one document, body kept as a JSON value tree
//! - [`DependencyScanner`]: finds references (links, references, hierarchy parents)
//! - [`Dependency`]: a reference *position* that can be rewritten or nulled in place
//! - [`load_export`]: reads an exported directory tree of records
//!
//! # Example
//!
//! ```rust,ignore
//! use cmig_content::{load_export, DependencyScanner};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let export = load_export("./export").await?;
//! let scanner = DependencyScanner::new();
//! for source in &export.records {
//!     println!("{} -> {} refs", source.record.label, scanner.scan(&source.record).len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod dependency;
pub mod error;
pub mod loader;
pub mod record;

pub use dependency::{
    match_link, Dependency, DependencyKind, DependencyScanner, LinkMatcher, LinkShape,
    CONTENT_LINK_SCHEMA, CONTENT_REFERENCE_SCHEMA, HIERARCHY_SCHEMA,
};
pub use error::{ContentError, LoadError};
pub use loader::{load_export, read_record, LoadedExport, SourceRecord};
pub use record::{ContentRecord, ContentStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
