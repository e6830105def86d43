//! Content record model
//!
//! A [`ContentRecord`] is one structured document as exported from, or
//! created in, a content hub. The body is kept as a generic JSON value tree
//! so that references can be found and rewritten without knowing the
//! document's schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON pointer of the schema URI inside a body
pub const SCHEMA_POINTER: &str = "/_meta/schema";

/// JSON pointer of the hierarchy parent id inside a body
pub const PARENT_ID_POINTER: &str = "/_meta/hierarchy/parentId";

/// JSON pointer of the delivery key inside a body
pub const DELIVERY_KEY_POINTER: &str = "/_meta/deliveryKey";

/// Lifecycle status of a remote record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    /// Live, editable record
    #[default]
    Active,
    /// Archived record; must be unarchived before it can be updated
    Archived,
}

/// A single content record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    /// Remote identifier (absent for records not yet created)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Human readable label
    pub label: String,
    /// Locale, if the record is localized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Owning repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
    /// Owning folder (absent at repository root)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    /// Remote version counter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Version that was last published, if ever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_published_version: Option<u64>,
    /// Lifecycle status
    #[serde(default)]
    pub status: ContentStatus,
    /// Document body (carries `_meta.schema`)
    pub body: Value,
}

impl ContentRecord {
    /// Create a new, not-yet-created record
    #[inline]
    #[must_use]
    pub fn new(label: impl Into<String>, body: Value) -> Self {
        Self {
            id: None,
            label: label.into(),
            locale: None,
            repository_id: None,
            folder_id: None,
            version: None,
            last_published_version: None,
            status: ContentStatus::Active,
            body,
        }
    }

    /// With remote id
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// With locale
    #[inline]
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// With last published version
    #[inline]
    #[must_use]
    pub fn with_last_published_version(mut self, version: u64) -> Self {
        self.last_published_version = Some(version);
        self
    }

    /// Schema URI from `_meta.schema`
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.body.pointer(SCHEMA_POINTER).and_then(Value::as_str)
    }

    /// Hierarchy parent id from `_meta.hierarchy.parentId`
    #[must_use]
    pub fn parent_id(&self) -> Option<&str> {
        self.body.pointer(PARENT_ID_POINTER).and_then(Value::as_str)
    }

    /// Whether the record is archived remotely
    #[inline]
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.status == ContentStatus::Archived
    }

    /// Whether the source declared a previously published version
    #[inline]
    #[must_use]
    pub fn was_published(&self) -> bool {
        self.last_published_version.is_some()
    }

    /// Remove `_meta.deliveryKey` from the body, returning the removed key
    pub fn strip_delivery_key(&mut self) -> Option<Value> {
        self.body
            .get_mut("_meta")
            .and_then(Value::as_object_mut)
            .and_then(|meta| meta.remove("deliveryKey"))
    }

    /// Short display form: `label (id)`
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.id {
            Some(id) => format!("{} ({})", self.label, id),
            None => self.label.clone(),
        }
    }
}
