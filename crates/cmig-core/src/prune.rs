//! Dependency validation before creation
//!
//! Finds records that cannot be migrated and records whose references point
//! nowhere, and works out which dangling references can be nulled without
//! breaking the owner's schema.

use crate::hub::Validator;
use cmig_content::{ContentError, Dependency};
use cmig_graph::{DependencyGraph, GraphItem, NodeId};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// `seeds` plus every node that transitively depends on one of them
pub fn with_dependants<T: GraphItem>(
    graph: &DependencyGraph<T>,
    seeds: impl IntoIterator<Item = NodeId>,
) -> BTreeSet<NodeId> {
    let mut all = BTreeSet::new();
    for seed in seeds {
        if all.insert(seed) {
            all.extend(graph.dependant_closure(seed, |_| true));
        }
    }
    all
}

/// Records whose schema has no content type, and everything depending on them
///
/// Values are the reason each record is dropped.
pub fn unmigratable<T, F>(graph: &DependencyGraph<T>, has_type: F) -> BTreeMap<NodeId, String>
where
    T: GraphItem,
    F: Fn(&str) -> bool,
{
    let seeds: Vec<NodeId> = graph
        .node_ids()
        .filter(|&id| !graph.node(id).record().schema().is_some_and(&has_type))
        .collect();

    let mut reasons = BTreeMap::new();
    for &seed in &seeds {
        let record = graph.node(seed).record();
        let reason = match record.schema() {
            Some(schema) => format!("no content type for schema {schema}"),
            None => "record has no schema".to_string(),
        };
        reasons.insert(seed, reason);
    }
    for &seed in &seeds {
        let label = graph.node(seed).record().label.clone();
        for dependant in graph.dependant_closure(seed, |_| true) {
            reasons
                .entry(dependant)
                .or_insert_with(|| format!("depends on unmigratable record '{label}'"));
        }
    }

    reasons
}

/// References that target neither the batch nor a mapped id
///
/// Nodes in `excluded` are ignored.
pub fn dangling<T, F>(
    graph: &DependencyGraph<T>,
    excluded: &BTreeSet<NodeId>,
    is_mapped: F,
) -> BTreeMap<NodeId, Vec<Dependency>>
where
    T: GraphItem,
    F: Fn(&str) -> bool,
{
    graph
        .node_ids()
        .filter(|id| !excluded.contains(id))
        .filter_map(|id| {
            let missing: Vec<Dependency> = graph
                .node(id)
                .dependencies
                .iter()
                .filter(|d| !d.is_internal() && !is_mapped(&d.dependency.target_id))
                .map(|d| d.dependency.clone())
                .collect();
            (!missing.is_empty()).then_some((id, missing))
        })
        .collect()
}

/// Outcome of trying to null dangling references
#[derive(Debug, Default)]
pub struct NullingPlan {
    /// Records that stay valid with the references nulled, with the new body
    pub nullable: Vec<(NodeId, Value)>,
    /// Records that would break their schema, with the validator's messages
    pub rejected: Vec<(NodeId, Vec<String>)>,
}

/// Null every dangling reference on a copy of each body and validate it
///
/// # Errors
/// `ContentError::PositionNotFound` if a reference position vanished.
pub async fn plan_nulling<T: GraphItem>(
    graph: &DependencyGraph<T>,
    dangling: &BTreeMap<NodeId, Vec<Dependency>>,
    validator: &dyn Validator,
) -> Result<NullingPlan, ContentError> {
    let mut plan = NullingPlan::default();

    for (&id, dependencies) in dangling {
        let mut body = graph.node(id).record().body.clone();
        for dependency in dependencies {
            dependency.null_out(&mut body)?;
        }

        let issues = validator.validate(&body).await;
        if issues.is_empty() {
            plan.nullable.push((id, body));
        } else {
            tracing::debug!(
                "Nulling references of {} breaks its schema: {:?}",
                graph.node(id).record().describe(),
                issues
            );
            plan.rejected.push((id, issues));
        }
    }

    Ok(plan)
}
