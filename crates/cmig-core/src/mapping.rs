//! Old-id → new-id mapping store
//!
//! Two independent tables: content items and content types. Entries are
//! only ever added during a run, and an id registered during this process
//! keeps its first mapping. The store is loaded from and flushed to a JSON
//! file of the form `{ "contentItems": [[old, new], ...] }`.

use crate::error::MappingError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// On-disk shape
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MappingFile {
    #[serde(default)]
    content_items: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    content_types: Vec<(String, String)>,
}

/// Durable id translation tables
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    path: Option<PathBuf>,
    content_items: IndexMap<String, String>,
    content_types: IndexMap<String, String>,
    registered: HashSet<String>,
    changed: bool,
}

impl MappingStore {
    /// Empty in-memory store (never written to disk)
    #[inline]
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`
    ///
    /// A missing or unreadable file yields an empty store bound to `path`.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut store = Self {
            path: Some(path.clone()),
            ..Self::default()
        };

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No mapping at {}, starting empty", path.display());
                return store;
            }
            Err(e) => {
                tracing::warn!("Could not read mapping {}: {}; starting empty", path.display(), e);
                return store;
            }
        };

        match serde_json::from_str::<MappingFile>(&text) {
            Ok(file) => {
                store.content_items = file.content_items.into_iter().collect();
                store.content_types = file.content_types.into_iter().collect();
                tracing::info!(
                    "Loaded mapping {} ({} items, {} types)",
                    path.display(),
                    store.content_items.len(),
                    store.content_types.len()
                );
            }
            Err(e) => {
                tracing::warn!("Mapping {} is corrupt: {}; starting empty", path.display(), e);
            }
        }

        store
    }

    /// File this store persists to, if any
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// New id for an old content item id
    #[inline]
    #[must_use]
    pub fn content_item(&self, old_id: &str) -> Option<&str> {
        self.content_items.get(old_id).map(String::as_str)
    }

    /// Whether an old content item id is mapped
    #[inline]
    #[must_use]
    pub fn has_content_item(&self, old_id: &str) -> bool {
        self.content_items.contains_key(old_id)
    }

    /// Record `old_id → new_id` for a content item
    ///
    /// Returns `false` (and keeps the first mapping) if `old_id` was already
    /// registered by this process with a different new id.
    pub fn register_content_item(&mut self, old_id: &str, new_id: &str) -> bool {
        if self.registered.contains(old_id) {
            if self.content_item(old_id) != Some(new_id) {
                tracing::warn!(
                    "Ignoring remap of {} to {}; already mapped to {:?} in this run",
                    old_id,
                    new_id,
                    self.content_item(old_id)
                );
                return false;
            }
            return true;
        }

        self.registered.insert(old_id.to_string());
        let previous = self
            .content_items
            .insert(old_id.to_string(), new_id.to_string());
        if previous.as_deref() != Some(new_id) {
            self.changed = true;
        }
        true
    }

    /// New id for an old content type id (or schema URI)
    #[inline]
    #[must_use]
    pub fn content_type(&self, old_id: &str) -> Option<&str> {
        self.content_types.get(old_id).map(String::as_str)
    }

    /// Record `old_id → new_id` for a content type
    pub fn register_content_type(&mut self, old_id: &str, new_id: &str) {
        if !self.content_types.contains_key(old_id) {
            self.content_types
                .insert(old_id.to_string(), new_id.to_string());
            self.changed = true;
        }
    }

    /// Whether any entry was added or replaced since the store was loaded
    #[inline]
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.changed
    }

    /// All content item pairs in insertion order
    pub fn content_items(&self) -> impl Iterator<Item = (&str, &str)> {
        self.content_items
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of mapped content items
    #[inline]
    #[must_use]
    pub fn content_item_count(&self) -> usize {
        self.content_items.len()
    }

    /// Number of mapped content types
    #[inline]
    #[must_use]
    pub fn content_type_count(&self) -> usize {
        self.content_types.len()
    }

    /// Serialized JSON document
    ///
    /// # Errors
    /// `MappingError::Serialize` if serialization fails.
    pub fn to_json(&self) -> Result<String, MappingError> {
        let file = MappingFile {
            content_items: self
                .content_items
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            content_types: self
                .content_types
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Write to the bound file (no-op for in-memory stores)
    ///
    /// Writes a sibling temp file and renames it over the target, so a later
    /// load sees either the old or the new complete document.
    ///
    /// # Errors
    /// `MappingError` on serialization or IO failure.
    pub async fn save(&self) -> Result<(), MappingError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = self.to_json()?;
        let tmp = path.with_extension("json.tmp");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| MappingError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| MappingError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|source| MappingError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(
            "Saved mapping {} ({} items)",
            path.display(),
            self.content_items.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn register_is_stable_within_run() {
        let mut store = MappingStore::in_memory();
        assert!(store.register_content_item("old", "new-1"));
        assert!(store.register_content_item("old", "new-1"));
        assert!(!store.register_content_item("old", "new-2"));
        assert_eq!(store.content_item("old"), Some("new-1"));
    }

    #[tokio::test]
    async fn loaded_entry_can_be_replaced_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(&path, r#"{"contentItems":[["old","stale"]]}"#).unwrap();

        let mut store = MappingStore::load(&path).await;
        assert_eq!(store.content_item("old"), Some("stale"));
        assert!(store.register_content_item("old", "fresh"));
        assert_eq!(store.content_item("old"), Some("fresh"));
        assert!(!store.register_content_item("old", "other"));
    }

    #[tokio::test]
    async fn missing_or_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = MappingStore::load(dir.path().join("none.json")).await;
        assert_eq!(missing.content_item_count(), 0);

        let corrupt_path = dir.path().join("bad.json");
        std::fs::write(&corrupt_path, "{ contentItems: ").unwrap();
        let corrupt = MappingStore::load(&corrupt_path).await;
        assert_eq!(corrupt.content_item_count(), 0);
        assert_eq!(corrupt.path(), Some(corrupt_path.as_path()));
    }

    #[tokio::test]
    async fn save_then_load_keeps_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/map.json");

        let mut store = MappingStore::load(&path).await;
        store.register_content_item("a", "1");
        store.register_content_item("b", "2");
        store.save().await.unwrap();

        let reloaded = MappingStore::load(&path).await;
        reloaded.save().await.unwrap();
        let again = MappingStore::load(&path).await;

        let first: BTreeSet<_> = store.content_items().collect();
        let second: BTreeSet<_> = again.content_items().collect();
        assert_eq!(first, second);
        assert!(!dir.path().join("nested/map.json.tmp").exists());
    }

    #[test]
    fn json_shape_omits_empty_types() {
        let mut store = MappingStore::in_memory();
        store.register_content_item("x", "y");
        let json: serde_json::Value = serde_json::from_str(&store.to_json().unwrap()).unwrap();

        assert_eq!(json, serde_json::json!({ "contentItems": [["x", "y"]] }));

        store.register_content_type("https://example.com/t.json", "type-1");
        let json: serde_json::Value = serde_json::from_str(&store.to_json().unwrap()).unwrap();
        assert_eq!(json["contentTypes"][0][1], "type-1");
    }

    #[tokio::test]
    async fn changes_track_new_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(&path, r#"{"contentItems":[["a","1"]]}"#).unwrap();

        let mut store = MappingStore::load(&path).await;
        assert!(!store.has_changes());

        store.register_content_item("a", "1");
        assert!(!store.has_changes());

        store.register_content_type("https://example.com/t.json", "type-1");
        assert!(store.has_changes());
    }

    #[tokio::test]
    async fn in_memory_save_is_noop() {
        let store = MappingStore::in_memory();
        assert!(store.save().await.is_ok());
    }
}
