//! cmig reference graph
//!
//! Turns a batch of content records into a creation plan:
//!
//! ```text
//! records ─▶ GraphBuilder::scan ─▶ DependencyGraph ─▶ assign_levels ─▶ Level 1..N + circular set
//!                                        │
//!                                        └─▶ TreePrinter (diagnostic view)
//! ```
//!
//! For any node in level *k*, every in-batch dependency that is not already
//! resolved externally lies in a level below *k*. Nodes that can never be
//! placed (cycles, or records blocked behind one) form the circular set.

#![warn(unreachable_pub)]

pub mod graph;
pub mod level;
pub mod tree;

pub use graph::{
    DependencyGraph, DependencyNode, GraphBuilder, GraphItem, NodeId, ResolvedDependency,
};
pub use level::{level_nodes, Level, Leveling};
pub use tree::{cycle_groups, TreePrinter};
