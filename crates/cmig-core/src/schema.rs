//! JSON Schema validator built from the hub's schema catalog
//!
//! Bodies are checked against the schema named by their `_meta.schema`.
//! `$ref`s are answered from the catalog; the core link and hierarchy
//! definitions are served locally, and any other unknown document resolves
//! to an empty (accept-all) schema.

use crate::hub::{ContentTypeSchema, Validator};
use jsonschema::{JSONSchema, SchemaResolver, SchemaResolverError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

const CORE_SCHEMA: &str = "http://bigcontent.io/cms/schema/v1/core";
const HIERARCHY_SCHEMA: &str = "http://bigcontent.io/cms/schema/v2/hierarchy";

fn core_definitions() -> Value {
    let link = json!({
        "type": "object",
        "properties": {
            "_meta": { "type": "object" },
            "contentType": { "type": "string" },
            "id": { "type": "string" }
        }
    });
    json!({
        "definitions": {
            "content-link": link.clone(),
            "content-reference": link.clone(),
            "hierarchy": link,
            "localized-value": { "type": "object" },
            "localized-string": { "type": "object" }
        }
    })
}

fn strip_fragment(uri: &str) -> &str {
    uri.split_once('#').map_or(uri, |(base, _)| base)
}

struct CatalogResolver {
    documents: HashMap<String, Arc<Value>>,
}

impl SchemaResolver for CatalogResolver {
    fn resolve(
        &self,
        _root_schema: &Value,
        url: &url::Url,
        _original_reference: &str,
    ) -> Result<Arc<Value>, SchemaResolverError> {
        let key = strip_fragment(url.as_str());
        if let Some(document) = self.documents.get(key) {
            return Ok(Arc::clone(document));
        }
        if key == CORE_SCHEMA || key == HIERARCHY_SCHEMA {
            return Ok(Arc::new(core_definitions()));
        }
        tracing::debug!("Unknown schema reference {}, accepting anything", key);
        Ok(Arc::new(json!({})))
    }
}

/// Validator over compiled catalog schemas
pub struct SchemaValidator {
    compiled: HashMap<String, JSONSchema>,
    broken: HashMap<String, String>,
}

impl SchemaValidator {
    /// Compile every schema in the catalog
    ///
    /// Schemas that fail to parse or compile are remembered; bodies that
    /// name them get the compile error back as their validation message.
    #[must_use]
    pub fn from_catalog(catalog: &[ContentTypeSchema]) -> Self {
        let mut parsed = HashMap::new();
        let mut broken = HashMap::new();

        for schema in catalog {
            match serde_json::from_str::<Value>(&schema.body) {
                Ok(document) => {
                    parsed.insert(schema.schema_id.clone(), Arc::new(document));
                }
                Err(e) => {
                    broken.insert(schema.schema_id.clone(), format!("schema is not JSON: {e}"));
                }
            }
        }

        let mut compiled = HashMap::new();
        for (schema_id, document) in &parsed {
            let resolver = CatalogResolver {
                documents: parsed.clone(),
            };
            match JSONSchema::options()
                .with_resolver(resolver)
                .compile(document)
            {
                Ok(schema) => {
                    compiled.insert(schema_id.clone(), schema);
                }
                Err(e) => {
                    tracing::warn!("Schema {} does not compile: {}", schema_id, e);
                    broken.insert(schema_id.clone(), format!("schema does not compile: {e}"));
                }
            }
        }

        tracing::debug!("Compiled {} schemas ({} broken)", compiled.len(), broken.len());
        Self { compiled, broken }
    }

    /// Whether a compiled schema exists for `schema_id`
    #[inline]
    #[must_use]
    pub fn knows(&self, schema_id: &str) -> bool {
        self.compiled.contains_key(schema_id)
    }

    fn check(&self, body: &Value) -> Vec<String> {
        let Some(schema_id) = body.pointer(cmig_content::record::SCHEMA_POINTER).and_then(Value::as_str)
        else {
            return vec!["body has no _meta.schema".to_string()];
        };

        if let Some(reason) = self.broken.get(schema_id) {
            return vec![reason.clone()];
        }
        let Some(schema) = self.compiled.get(schema_id) else {
            return vec![format!("no schema {schema_id} on the hub")];
        };

        match schema.validate(body) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| {
                    let at = e.instance_path.to_string();
                    if at.is_empty() {
                        e.to_string()
                    } else {
                        format!("{at}: {e}")
                    }
                })
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl Validator for SchemaValidator {
    async fn validate(&self, body: &Value) -> Vec<String> {
        self.check(body)
    }
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("compiled", &self.compiled.len())
            .field("broken", &self.broken.len())
            .finish()
    }
}
