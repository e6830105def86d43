//! Read-only tree view of a leveled graph
//!
//! Levels are printed from the top down; each record nobody depends on is
//! printed as a root with its dependencies indented below it. Circular
//! records are grouped into strongly connected components.

use crate::graph::{DependencyGraph, GraphItem, NodeId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Write};

/// Renders a [`DependencyGraph`] as an indented tree
pub struct TreePrinter<'g, T> {
    graph: &'g DependencyGraph<T>,
    is_resolved: Option<&'g dyn Fn(&str) -> bool>,
}

impl<'g, T: GraphItem> TreePrinter<'g, T> {
    /// Printer over `graph`
    #[must_use]
    pub fn new(graph: &'g DependencyGraph<T>) -> Self {
        Self {
            graph,
            is_resolved: None,
        }
    }

    /// Annotate external targets as mapped or missing
    #[must_use]
    pub fn with_resolver(mut self, is_resolved: &'g dyn Fn(&str) -> bool) -> Self {
        self.is_resolved = Some(is_resolved);
        self
    }

    /// Circular nodes grouped by strongly connected component
    ///
    /// Groups follow batch order of their first member. Single nodes that
    /// are only blocked behind a cycle form their own group.
    #[must_use]
    pub fn cycle_groups(&self) -> Vec<Vec<NodeId>> {
        cycle_groups(self.graph)
    }

    fn write_node(
        &self,
        out: &mut impl Write,
        id: NodeId,
        prefix: &str,
        path: &mut Vec<NodeId>,
        seen: &mut BTreeSet<NodeId>,
    ) -> fmt::Result {
        let node = self.graph.node(id);
        let count = node.dependencies.len();

        for (i, dep) in node.dependencies.iter().enumerate() {
            let last = i + 1 == count;
            let branch = if last { "└─ " } else { "├─ " };
            let kind = if dep.dependency.kind.is_hierarchy() {
                " [parent]"
            } else {
                ""
            };

            match dep.target {
                Some(target) if path.contains(&target) => {
                    writeln!(
                        out,
                        "{prefix}{branch}{}{kind} *** circular",
                        self.graph.node(target).record().describe()
                    )?;
                }
                Some(target) if self.printed_before(target, seen) => {
                    writeln!(
                        out,
                        "{prefix}{branch}{}{kind} (see above)",
                        self.graph.node(target).record().describe()
                    )?;
                }
                Some(target) => {
                    writeln!(
                        out,
                        "{prefix}{branch}{}{kind}",
                        self.graph.node(target).record().describe()
                    )?;
                    seen.insert(target);
                    let child_prefix = format!("{prefix}{}", if last { "   " } else { "│  " });
                    path.push(target);
                    self.write_node(out, target, &child_prefix, path, seen)?;
                    path.pop();
                }
                None => {
                    let status = match self.is_resolved {
                        Some(resolved) if resolved(&dep.dependency.target_id) => "mapped",
                        Some(_) => "missing",
                        None => "external",
                    };
                    writeln!(
                        out,
                        "{prefix}{branch}{}{kind} ({status})",
                        dep.dependency.target_id
                    )?;
                }
            }
        }

        Ok(())
    }

    /// A subtree is expanded once; later occurrences only point back at it
    fn printed_before(&self, id: NodeId, seen: &BTreeSet<NodeId>) -> bool {
        seen.contains(&id) && !self.graph.node(id).dependencies.is_empty()
    }

    fn write_root(
        &self,
        out: &mut impl Write,
        id: NodeId,
        seen: &mut BTreeSet<NodeId>,
    ) -> fmt::Result {
        let describe = self.graph.node(id).record().describe();
        if self.printed_before(id, seen) {
            return writeln!(out, "{describe} (see above)");
        }
        writeln!(out, "{describe}")?;
        seen.insert(id);
        let mut path = vec![id];
        self.write_node(out, id, "", &mut path, seen)
    }
}

impl<T: GraphItem> fmt::Display for TreePrinter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let levels = self.graph.levels();
        let mut seen = BTreeSet::new();

        for (index, level) in levels.iter().enumerate().rev() {
            writeln!(f, "=== LEVEL {} ({}) ===", index + 1, level.len())?;
            for &id in &level.nodes {
                if self.graph.node(id).dependants.is_empty() {
                    self.write_root(f, id, &mut seen)?;
                }
            }
            writeln!(f)?;
        }

        let groups = self.cycle_groups();
        if !groups.is_empty() {
            writeln!(f, "=== CIRCULAR ({}) ===", self.graph.circular().len())?;
            for (index, group) in groups.iter().enumerate() {
                writeln!(f, "--- group {} ({}) ---", index + 1, group.len())?;
                for &id in group {
                    self.write_root(f, id, &mut seen)?;
                }
            }
            writeln!(f)?;
        }

        writeln!(
            f,
            "{} records: {} levels, {} circular",
            self.graph.len(),
            levels.len(),
            self.graph.circular().len()
        )
    }
}

/// Group the circular set of `graph` into strongly connected components
pub fn cycle_groups<T: GraphItem>(graph: &DependencyGraph<T>) -> Vec<Vec<NodeId>> {
    let members: BTreeSet<NodeId> = graph.circular().iter().copied().collect();
    let mut sub: DiGraph<NodeId, ()> = DiGraph::new();
    let mut index = HashMap::with_capacity(members.len());

    for &id in &members {
        index.insert(id, sub.add_node(id));
    }
    for &id in &members {
        for dep in &graph.node(id).dependencies {
            if let Some(target) = dep.target.filter(|t| members.contains(t)) {
                sub.add_edge(index[&id], index[&target], ());
            }
        }
    }

    let mut groups: Vec<Vec<NodeId>> = tarjan_scc(&sub)
        .into_iter()
        .map(|component| {
            let mut ids: Vec<NodeId> = component.into_iter().map(|n| sub[n]).collect();
            ids.sort();
            ids
        })
        .collect();
    groups.sort_by_key(|group| group[0]);
    groups
}
