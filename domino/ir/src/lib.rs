//! Control-flow graph representation for the domino analyses.
//!
//! The representation is deliberately minimal: an append-only arena of nodes
//! that records, for every node, its branching structure and its unique
//! incoming control edge. It is meant to model the portion of a program's
//! control flow that a front-end has built *so far*, so nodes are only ever
//! added, and edges are fixed when their target is created (with the one
//! exception of join points, which may grow incoming paths while the region
//! around them is still under construction).
//!
//! Node identity is the arena index ([NodeIdx]); two nodes are the same node
//! exactly when their handles are equal.

mod builder;
mod structure;

pub use builder::Builder;
pub use structure::{FlowGraph, FlowNode, NodeIdx, NodeKind};
