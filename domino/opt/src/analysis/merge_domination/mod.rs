//! Finds the immediate dominator of a control-flow join while the graph
//! around it is still being constructed, using only the region built so far.
//!
//! This is the "is it safe to simplify this merge yet" question a front-end
//! faces when lowering a program incrementally: once a join's immediate
//! dominator is known, a merge whose incoming values agree can be collapsed
//! onto it. A global dominator-tree algorithm is useless here because the
//! full graph does not exist yet, so the resolver works backwards instead.
//!
//! Here is the algorithm we use to answer one query against a join J.
//! - Attach a "full" label to J containing the reserved path bit 0. The
//!   label's bit set is the *target set*: it grows whenever a new
//!   distinguishable path is discovered, and a node whose label ever equals
//!   it is reached by every path into J, i.e. it dominates J.
//! - Seed one child label per incoming path of J and walk each path upward
//!   through its predecessor chain. Nodes without branching structure are
//!   transparent: the walk passes through them without allocating anything.
//! - A join encountered on the way up is treated exactly like J itself: its
//!   incoming paths get child labels of the label that arrived, and each
//!   child whose sibling paths need telling apart is given a fresh path bit
//!   (which is also pushed into every ancestor label, so the target set
//!   learns that a new path exists).
//! - A split encountered on the way up aggregates the labels arriving from
//!   its arms into one orphan label. Only when every arm has reported in is
//!   it *known* safe to continue past the split, so the split's predecessor
//!   waits on a speculative (deferred) worklist until then and is promoted
//!   to the ready worklist at that point. Information arriving after the
//!   walk already continued past a split is back-propagated through the
//!   label graph instead of re-walking edges.
//! - The first label whose bits equal the target set names the answer.
//!
//! The ready worklist is always drained before a single deferred item is
//! taken, which biases the search toward certain, early termination over
//! speculative work.
//!
//! All labels live in a per-query arena owned by the query's label store;
//! nothing is shared between queries, and a query never mutates the graph.

mod path_label;
mod resolver;

use domino_ir::NodeIdx;
use thiserror::Error;

pub use resolver::DominatorResolver;

/// Failure modes of a dominator query.
#[derive(Error, Debug)]
pub enum DominatorError {
    /// Both worklists ran dry before any label covered the full target set:
    /// the join is not dominated by any single ancestor inside the walked
    /// region. This means the caller handed us a malformed graph, and is
    /// fatal to the enclosing unit of compilation. The rendered label map is
    /// kept for postmortem diagnosis.
    #[error(
        "no immediate dominator for join {join}; partial label map:\n{labels}"
    )]
    UnresolvableDominator { join: NodeIdx, labels: String },
}
