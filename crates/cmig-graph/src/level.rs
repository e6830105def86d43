//! Creation-order leveling
//!
//! Fixpoint peeling: each round extracts every remaining node whose
//! dependencies are all either resolved externally or placed in an earlier
//! round. Nodes extracted in the same round form one [`Level`] and never
//! depend on each other. When a round extracts nothing, whatever is left
//! is the circular set.

use crate::graph::{DependencyNode, GraphItem, NodeId};

/// Nodes that can be created together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Level {
    /// Members in batch order
    pub nodes: Vec<NodeId>,
}

impl Level {
    /// Number of members
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the level is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Output of [`level_nodes`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leveling {
    /// Levels, lowest (no blocking dependencies) first
    pub levels: Vec<Level>,
    /// Nodes left over once no more progress is possible, in batch order
    pub circular: Vec<NodeId>,
}

/// Partition `nodes` into levels plus a circular residue
///
/// A dependency is satisfied when `is_resolved(target_id)` holds, or when its
/// in-batch target was placed in an earlier round. Extraction within a round
/// follows batch order, so the result is deterministic.
pub fn level_nodes<T, F>(nodes: &[DependencyNode<T>], is_resolved: F) -> Leveling
where
    T: GraphItem,
    F: Fn(&str) -> bool,
{
    let mut placed = vec![false; nodes.len()];
    let mut remaining: Vec<NodeId> = (0..nodes.len()).map(NodeId).collect();
    let mut levels = Vec::new();

    loop {
        let ready: Vec<NodeId> = remaining
            .iter()
            .copied()
            .filter(|id| {
                nodes[id.0].dependencies.iter().all(|dep| {
                    is_resolved(&dep.dependency.target_id)
                        || dep.target.is_some_and(|target| placed[target.0])
                })
            })
            .collect();

        if ready.is_empty() {
            break;
        }

        for id in &ready {
            placed[id.0] = true;
        }
        remaining.retain(|id| !placed[id.0]);
        levels.push(Level { nodes: ready });
    }

    Leveling {
        levels,
        circular: remaining,
    }
}
