//! Export directory loader
//!
//! Reads an exported content tree: one JSON file per record, with the
//! directory path relative to the export root standing in for the record's
//! folder. Unreadable or malformed files are skipped and reported; they never
//! abort the load.

use crate::error::{ContentError, LoadError};
use crate::record::ContentRecord;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A record read from disk together with where it was found
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Parsed record
    pub record: ContentRecord,
    /// File the record was read from
    pub path: PathBuf,
    /// Directory segments between the export root and the file
    pub folder_path: Vec<String>,
}

impl SourceRecord {
    /// Wrap a record that did not come from disk
    #[must_use]
    pub fn detached(record: ContentRecord, folder_path: Vec<String>) -> Self {
        Self {
            record,
            path: PathBuf::new(),
            folder_path,
        }
    }

    /// Folder path joined with `/`
    #[must_use]
    pub fn folder_key(&self) -> String {
        self.folder_path.join("/")
    }
}

/// Result of loading an export directory
#[derive(Debug, Default)]
pub struct LoadedExport {
    /// Successfully parsed records, ordered by path
    pub records: Vec<SourceRecord>,
    /// Files that were skipped
    pub skipped: Vec<ContentError>,
}

/// Loads every `*.json` record below `root`
///
/// Hidden entries (leading `.`) are ignored.
///
/// # Errors
/// `LoadError` only if `root` itself cannot be listed; per-file failures are
/// collected in [`LoadedExport::skipped`].
pub async fn load_export(root: impl AsRef<Path>) -> Result<LoadedExport, LoadError> {
    let root = root.as_ref();
    let meta = fs::metadata(root).await.map_err(|source| LoadError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(LoadError::NotADirectory(root.to_path_buf()));
    }

    let mut export = LoadedExport::default();
    let mut pending: Vec<(PathBuf, Vec<String>)> = vec![(root.to_path_buf(), Vec::new())];

    while let Some((dir, segments)) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(source) if dir == root => {
                return Err(LoadError::Io { path: dir, source });
            }
            Err(source) => {
                tracing::warn!("Skipping unreadable directory {}: {}", dir.display(), source);
                export.skipped.push(ContentError::io_error(&dir, source));
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    export.skipped.push(ContentError::io_error(&dir, source));
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            let is_dir = match entry.file_type().await {
                Ok(kind) => kind.is_dir(),
                Err(source) => {
                    export.skipped.push(ContentError::io_error(&path, source));
                    continue;
                }
            };

            if is_dir {
                let mut child = segments.clone();
                child.push(name);
                pending.push((path, child));
            } else if path.extension().is_some_and(|ext| ext == "json") {
                match read_record(&path).await {
                    Ok(record) => export.records.push(SourceRecord {
                        record,
                        path,
                        folder_path: segments.clone(),
                    }),
                    Err(err) => {
                        tracing::warn!("Skipping {}: {}", path.display(), err);
                        export.skipped.push(err);
                    }
                }
            }
        }
    }

    export.records.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::info!(
        "Loaded {} records from {} ({} skipped)",
        export.records.len(),
        root.display(),
        export.skipped.len()
    );

    Ok(export)
}

/// Parse one record file
///
/// # Errors
/// `ContentError::Io`, `ContentError::Parse`, or `ContentError::MissingSchema`.
pub async fn read_record(path: impl AsRef<Path>) -> Result<ContentRecord, ContentError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| ContentError::io_error(path, e))?;
    let record: ContentRecord =
        serde_json::from_str(&text).map_err(|e| ContentError::parse_error(path, e))?;

    if record.schema().is_none() {
        return Err(ContentError::MissingSchema {
            label: record.label,
        });
    }

    Ok(record)
}
