//! Reference graph over a batch of content records
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Forward edges
//! (dependencies) and reverse edges (dependants) are index sets, never
//! owning references, so cycles between records are just cycles of indices.

use crate::level::{level_nodes, Level, Leveling};
use cmig_content::{ContentRecord, Dependency, DependencyScanner, SourceRecord};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

/// Arena index of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Arena position
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything that carries a content record through the graph
pub trait GraphItem {
    /// Wrapped record
    fn record(&self) -> &ContentRecord;
    /// Wrapped record, mutably
    fn record_mut(&mut self) -> &mut ContentRecord;
}

impl GraphItem for ContentRecord {
    fn record(&self) -> &ContentRecord {
        self
    }

    fn record_mut(&mut self) -> &mut ContentRecord {
        self
    }
}

impl GraphItem for SourceRecord {
    fn record(&self) -> &ContentRecord {
        &self.record
    }

    fn record_mut(&mut self) -> &mut ContentRecord {
        &mut self.record
    }
}

/// A dependency plus its in-batch target, if the target is in the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    /// Position in the owner's body
    pub dependency: Dependency,
    /// Target node; `None` when the target lies outside the batch
    pub target: Option<NodeId>,
}

impl ResolvedDependency {
    /// Whether the target was found in the batch
    #[inline]
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.target.is_some()
    }
}

/// One record with its outgoing and incoming edges
#[derive(Debug, Clone)]
pub struct DependencyNode<T> {
    /// The record (and whatever travels with it)
    pub item: T,
    /// Outgoing references, in body order
    pub dependencies: Vec<ResolvedDependency>,
    /// Nodes that reference this one
    pub dependants: BTreeSet<NodeId>,
}

impl<T: GraphItem> DependencyNode<T> {
    /// Wrapped record
    #[inline]
    #[must_use]
    pub fn record(&self) -> &ContentRecord {
        self.item.record()
    }

    /// Source id of the wrapped record
    #[inline]
    #[must_use]
    pub fn source_id(&self) -> Option<&str> {
        self.item.record().id.as_deref()
    }

    /// Split borrow: mutable record and mutable dependency list
    pub fn parts_mut(&mut self) -> (&mut ContentRecord, &mut [ResolvedDependency]) {
        (self.item.record_mut(), &mut self.dependencies)
    }
}

/// Builds [`DependencyGraph`]s from record batches
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder {
    scanner: DependencyScanner,
}

impl GraphBuilder {
    /// Builder with the default scanner
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a custom scanner
    #[inline]
    #[must_use]
    pub fn with_scanner(mut self, scanner: DependencyScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Scan `items` and wire edges between records of the batch
    ///
    /// The result is not yet leveled; call [`DependencyGraph::assign_levels`].
    #[must_use]
    pub fn scan<T: GraphItem>(&self, items: Vec<T>) -> DependencyGraph<T> {
        let mut by_id: HashMap<String, NodeId> = HashMap::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if let Some(id) = item.record().id.as_deref() {
                if by_id.insert(id.to_string(), NodeId(index)).is_some() {
                    tracing::warn!("Duplicate record id {} in batch; last copy wins", id);
                }
            }
        }

        let mut schemas = BTreeSet::new();
        let mut nodes: Vec<DependencyNode<T>> = items
            .into_iter()
            .map(|item| {
                if let Some(schema) = item.record().schema() {
                    schemas.insert(schema.to_string());
                }
                let dependencies = self
                    .scanner
                    .scan(item.record())
                    .into_iter()
                    .map(|dependency| ResolvedDependency {
                        target: by_id.get(&dependency.target_id).copied(),
                        dependency,
                    })
                    .collect();
                DependencyNode {
                    item,
                    dependencies,
                    dependants: BTreeSet::new(),
                }
            })
            .collect();

        for owner in 0..nodes.len() {
            let targets: Vec<NodeId> = nodes[owner]
                .dependencies
                .iter()
                .filter_map(|d| d.target)
                .collect();
            for target in targets {
                nodes[target.0].dependants.insert(NodeId(owner));
            }
        }

        DependencyGraph {
            nodes,
            by_id,
            levels: Vec::new(),
            circular: Vec::new(),
            schemas,
        }
    }

    /// Scan and level in one step
    ///
    /// `is_resolved` reports ids that already exist remotely (previously
    /// migrated); dependencies on them never block a node.
    #[must_use]
    pub fn build<T, F>(&self, items: Vec<T>, is_resolved: F) -> DependencyGraph<T>
    where
        T: GraphItem,
        F: Fn(&str) -> bool,
    {
        let mut graph = self.scan(items);
        graph.assign_levels(is_resolved);
        graph
    }
}

/// Nodes, their creation levels, and the circular residue
#[derive(Debug, Clone)]
pub struct DependencyGraph<T> {
    nodes: Vec<DependencyNode<T>>,
    by_id: HashMap<String, NodeId>,
    levels: Vec<Level>,
    circular: Vec<NodeId>,
    schemas: BTreeSet<String>,
}

impl<T: GraphItem> DependencyGraph<T> {
    /// Partition nodes into levels plus the circular set
    pub fn assign_levels<F: Fn(&str) -> bool>(&mut self, is_resolved: F) {
        let Leveling { levels, circular } = level_nodes(&self.nodes, is_resolved);
        tracing::debug!(
            "Leveled {} nodes into {} levels, {} circular",
            self.nodes.len(),
            levels.len(),
            circular.len()
        );
        self.levels = levels;
        self.circular = circular;
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the batch is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in batch order
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[DependencyNode<T>] {
        &self.nodes
    }

    /// Node by id
    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> &DependencyNode<T> {
        &self.nodes[id.0]
    }

    /// Node by id, mutably
    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut DependencyNode<T> {
        &mut self.nodes[id.0]
    }

    /// Look up a node by source record id
    #[must_use]
    pub fn find(&self, source_id: &str) -> Option<NodeId> {
        self.by_id.get(source_id).copied()
    }

    /// Node ids in batch order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Creation levels, lowest first
    #[inline]
    #[must_use]
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Nodes that take part in (or are blocked behind) a cycle
    #[inline]
    #[must_use]
    pub fn circular(&self) -> &[NodeId] {
        &self.circular
    }

    /// Distinct `_meta.schema` URIs of the batch
    #[inline]
    #[must_use]
    pub fn required_schemas(&self) -> &BTreeSet<String> {
        &self.schemas
    }

    /// Level index of a node, `None` if circular
    #[must_use]
    pub fn level_of(&self, id: NodeId) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.nodes.contains(&id))
    }

    /// Dependencies whose target is outside the batch, with their owners
    pub fn external_dependencies(&self) -> impl Iterator<Item = (NodeId, &ResolvedDependency)> {
        self.nodes.iter().enumerate().flat_map(|(index, node)| {
            node.dependencies
                .iter()
                .filter(|d| !d.is_internal())
                .map(move |d| (NodeId(index), d))
        })
    }

    /// Every node that transitively depends on `start` (excluding `start`
    /// unless it sits on a cycle through itself)
    ///
    /// `follow` decides which dependency edges are walked backwards.
    #[must_use]
    pub fn dependant_closure<P>(&self, start: NodeId, follow: P) -> BTreeSet<NodeId>
    where
        P: Fn(&ResolvedDependency) -> bool,
    {
        let mut reached = BTreeSet::new();
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            for &dependant in &self.nodes[current.0].dependants {
                let walks = self.nodes[dependant.0]
                    .dependencies
                    .iter()
                    .any(|d| d.target == Some(current) && follow(d));
                if walks && reached.insert(dependant) {
                    queue.push_back(dependant);
                }
            }
        }

        reached
    }

    /// Consume the graph, returning items in batch order
    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        self.nodes.into_iter().map(|node| node.item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmig_content::{DependencyKind, CONTENT_LINK_SCHEMA};
    use serde_json::{json, Value};

    fn link(id: &str) -> Value {
        json!({ "_meta": { "schema": CONTENT_LINK_SCHEMA }, "contentType": "t", "id": id })
    }

    fn record(id: &str, schema: &str, refs: &[&str]) -> ContentRecord {
        let links: Vec<Value> = refs.iter().map(|r| link(r)).collect();
        ContentRecord::new(id, json!({ "_meta": { "schema": schema }, "links": links })).with_id(id)
    }

    #[test]
    fn builder_wires_edges_both_ways() {
        let graph = GraphBuilder::new().scan(vec![
            record("a", "s1", &[]),
            record("b", "s2", &["a", "outside"]),
        ]);

        let a = graph.find("a").unwrap();
        let b = graph.find("b").unwrap();

        assert_eq!(graph.node(b).dependencies[0].target, Some(a));
        assert_eq!(graph.node(b).dependencies[1].target, None);
        assert!(graph.node(a).dependants.contains(&b));
        assert!(graph.node(b).dependants.is_empty());

        let external: Vec<_> = graph
            .external_dependencies()
            .map(|(owner, d)| (owner, d.dependency.target_id.clone()))
            .collect();
        assert_eq!(external, vec![(b, "outside".to_string())]);
    }

    #[test]
    fn builder_collects_schemas() {
        let graph = GraphBuilder::new().scan(vec![
            record("a", "s1", &[]),
            record("b", "s2", &[]),
            record("c", "s1", &[]),
        ]);

        let schemas: Vec<_> = graph.required_schemas().iter().cloned().collect();
        assert_eq!(schemas, vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn builder_records_hierarchy_edges() {
        let parent = record("p", "s", &[]);
        let child = ContentRecord::new(
            "c",
            json!({ "_meta": { "schema": "s", "hierarchy": { "parentId": "p" } } }),
        )
        .with_id("c");

        let graph = GraphBuilder::new().scan(vec![parent, child]);
        let c = graph.find("c").unwrap();
        let dep = &graph.node(c).dependencies[0];

        assert_eq!(dep.dependency.kind, DependencyKind::Hierarchy);
        assert_eq!(dep.target, graph.find("p"));
    }

    #[test]
    fn dependant_closure_is_transitive_and_filtered() {
        let graph = GraphBuilder::new().scan(vec![
            record("a", "s", &[]),
            record("b", "s", &["a"]),
            record("c", "s", &["b"]),
            record("d", "s", &[]),
        ]);
        let a = graph.find("a").unwrap();

        let all = graph.dependant_closure(a, |_| true);
        assert_eq!(
            all,
            BTreeSet::from([graph.find("b").unwrap(), graph.find("c").unwrap()])
        );

        let none = graph.dependant_closure(a, |_| false);
        assert!(none.is_empty());
    }

    #[test]
    fn malformed_body_has_no_edges() {
        let odd = ContentRecord::new("odd", json!([1, "two", null])).with_id("odd");
        let graph = GraphBuilder::new().build(vec![odd], |_| false);

        assert!(graph.node(NodeId(0)).dependencies.is_empty());
        assert!(graph.required_schemas().is_empty());
        assert_eq!(graph.levels().len(), 1);
    }
}
