//! Reference detection inside record bodies
//!
//! A dependency is a *position* in a body: the JSON pointer of a link
//! object (or of the hierarchy `parentId`), together with the id it
//! currently targets. Rewriting a dependency edits the owning body in place.
//!
//! Detection is a single recursive walk over the value tree. The shape test
//! is a plain function ([`LinkMatcher`]) so callers can swap it; the
//! hierarchy parent link is synthesized separately rather than matched.

use crate::error::ContentError;
use crate::record::{ContentRecord, PARENT_ID_POINTER};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Schema URI tagging a content link
pub const CONTENT_LINK_SCHEMA: &str =
    "http://bigcontent.io/cms/schema/v1/core#/definitions/content-link";

/// Schema URI tagging a content reference
pub const CONTENT_REFERENCE_SCHEMA: &str =
    "http://bigcontent.io/cms/schema/v1/core#/definitions/content-reference";

/// Schema URI used for synthesized hierarchy (parent) dependencies
pub const HIERARCHY_SCHEMA: &str =
    "http://bigcontent.io/cms/schema/v2/hierarchy#/definitions/hierarchy";

/// Kind of reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Embedded content link
    ContentLink,
    /// Content reference (by id only)
    ContentReference,
    /// Hierarchy parent link from `_meta.hierarchy.parentId`
    Hierarchy,
}

impl DependencyKind {
    /// Schema URI for this kind
    #[inline]
    #[must_use]
    pub fn schema_uri(self) -> &'static str {
        match self {
            Self::ContentLink => CONTENT_LINK_SCHEMA,
            Self::ContentReference => CONTENT_REFERENCE_SCHEMA,
            Self::Hierarchy => HIERARCHY_SCHEMA,
        }
    }

    /// Parse from a link schema URI
    #[must_use]
    pub fn from_schema_uri(uri: &str) -> Option<Self> {
        match uri {
            CONTENT_LINK_SCHEMA => Some(Self::ContentLink),
            CONTENT_REFERENCE_SCHEMA => Some(Self::ContentReference),
            HIERARCHY_SCHEMA => Some(Self::Hierarchy),
            _ => None,
        }
    }

    /// Whether this is the hierarchy parent link
    #[inline]
    #[must_use]
    pub fn is_hierarchy(self) -> bool {
        matches!(self, Self::Hierarchy)
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentLink => write!(f, "content-link"),
            Self::ContentReference => write!(f, "content-reference"),
            Self::Hierarchy => write!(f, "hierarchy"),
        }
    }
}

/// A reference found in a record body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Reference kind
    pub kind: DependencyKind,
    /// JSON pointer of the link object (or of `parentId` for hierarchy links)
    pub pointer: String,
    /// Id currently referenced
    pub target_id: String,
    /// Declared content type of the target, if any
    pub content_type: Option<String>,
}

impl Dependency {
    /// Synthesized hierarchy dependency on `parent_id`
    #[must_use]
    pub fn hierarchy(parent_id: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::Hierarchy,
            pointer: PARENT_ID_POINTER.to_string(),
            target_id: parent_id.into(),
            content_type: None,
        }
    }

    /// Point this dependency at `new_id`, editing `body` in place
    ///
    /// # Errors
    /// `ContentError::PositionNotFound` if the pointer no longer resolves to
    /// an editable position.
    pub fn rewrite(&mut self, body: &mut Value, new_id: &str) -> Result<(), ContentError> {
        let slot = body
            .pointer_mut(&self.pointer)
            .ok_or_else(|| self.not_found())?;

        match slot {
            Value::Object(link) => {
                link.insert("id".to_string(), Value::String(new_id.to_string()));
            }
            Value::String(_) if self.kind.is_hierarchy() => {
                *slot = Value::String(new_id.to_string());
            }
            _ => return Err(self.not_found()),
        }

        self.target_id = new_id.to_string();
        Ok(())
    }

    /// Replace the referencing position with `null`
    ///
    /// Sibling positions are unaffected, so other dependencies of the same
    /// body stay addressable.
    ///
    /// # Errors
    /// `ContentError::PositionNotFound` if the pointer does not resolve.
    pub fn null_out(&self, body: &mut Value) -> Result<(), ContentError> {
        match body.pointer_mut(&self.pointer) {
            Some(slot) => {
                *slot = Value::Null;
                Ok(())
            }
            None => Err(self.not_found()),
        }
    }

    fn not_found(&self) -> ContentError {
        ContentError::PositionNotFound {
            pointer: self.pointer.clone(),
        }
    }
}

/// Shape of a matched link object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkShape<'a> {
    /// Kind derived from the link's `_meta.schema`
    pub kind: DependencyKind,
    /// Referenced id
    pub id: &'a str,
    /// Declared content type
    pub content_type: Option<&'a str>,
}

/// Pure predicate deciding whether a value is a dependency
pub type LinkMatcher = for<'a> fn(&'a Value) -> Option<LinkShape<'a>>;

/// Default matcher: `{ _meta.schema ∈ {content-link, content-reference, hierarchy}, contentType, id }`
#[must_use]
pub fn match_link(value: &Value) -> Option<LinkShape<'_>> {
    let object = value.as_object()?;
    let schema = object.get("_meta")?.get("schema")?.as_str()?;
    let kind = DependencyKind::from_schema_uri(schema)?;
    let id = object.get("id")?.as_str()?;
    let content_type = object.get("contentType").and_then(Value::as_str);

    Some(LinkShape {
        kind,
        id,
        content_type,
    })
}

/// Recursive body scanner
#[derive(Debug, Clone, Copy)]
pub struct DependencyScanner {
    matcher: LinkMatcher,
    include_hierarchy: bool,
}

impl DependencyScanner {
    /// Scanner with the default link matcher and hierarchy synthesis on
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            matcher: match_link,
            include_hierarchy: true,
        }
    }

    /// With a custom link matcher
    #[inline]
    #[must_use]
    pub fn with_matcher(mut self, matcher: LinkMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Toggle synthesis of the hierarchy parent dependency
    #[inline]
    #[must_use]
    pub fn with_hierarchy(mut self, include: bool) -> Self {
        self.include_hierarchy = include;
        self
    }

    /// All dependencies of a record, in body order, hierarchy last
    #[must_use]
    pub fn scan(&self, record: &ContentRecord) -> Vec<Dependency> {
        let mut found = Vec::new();
        let mut pointer = String::new();
        self.visit(&record.body, &mut pointer, &mut found);

        if self.include_hierarchy {
            if let Some(parent_id) = record.parent_id() {
                found.push(Dependency::hierarchy(parent_id));
            }
        }

        found
    }

    fn visit(&self, value: &Value, pointer: &mut String, found: &mut Vec<Dependency>) {
        if let Some(shape) = (self.matcher)(value) {
            found.push(Dependency {
                kind: shape.kind,
                pointer: pointer.clone(),
                target_id: shape.id.to_string(),
                content_type: shape.content_type.map(str::to_string),
            });
            return;
        }

        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let len = pointer.len();
                    pointer.push('/');
                    push_escaped(pointer, key);
                    self.visit(child, pointer, found);
                    pointer.truncate(len);
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    let len = pointer.len();
                    pointer.push('/');
                    pointer.push_str(&index.to_string());
                    self.visit(child, pointer, found);
                    pointer.truncate(len);
                }
            }
            _ => {}
        }
    }
}

impl Default for DependencyScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// RFC 6901 escaping of one pointer segment
fn push_escaped(pointer: &mut String, key: &str) {
    for ch in key.chars() {
        match ch {
            '~' => pointer.push_str("~0"),
            '/' => pointer.push_str("~1"),
            other => pointer.push(other),
        }
    }
}
