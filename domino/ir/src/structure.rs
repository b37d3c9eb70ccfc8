//! Flow-graph nodes and the arena that owns them.
use domino_utils::{IndexedMap, impl_index};
use smallvec::SmallVec;

/// Handle for a node in a [FlowGraph].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeIdx(u32);
impl_index!(NodeIdx);

impl std::fmt::Display for NodeIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The branching structure of a node, as far as control flow is concerned.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Straight-line node: at most one incoming edge, one outgoing edge.
    Plain,
    /// Control split with a fixed number of outgoing arms.
    Split {
        /// Number of outgoing control edges created for this split.
        arms: usize,
    },
    /// Control join. `tails` are the ordered path-tail nodes whose outgoing
    /// edges converge here. A join holds a single tail only transiently,
    /// while the region feeding it is still being built.
    Join { tails: SmallVec<[NodeIdx; 2]> },
}

/// A single node in a control-flow graph under construction.
#[derive(Debug, Clone)]
pub struct FlowNode {
    pub kind: NodeKind,
    /// The unique incoming control edge, or `None` if this node begins the
    /// built region. Joins record their incoming edges in
    /// [NodeKind::Join] instead and keep this `None`.
    pub predecessor: Option<NodeIdx>,
}

/// An append-only arena of [FlowNode]s.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: IndexedMap<NodeIdx, FlowNode>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, n: NodeIdx) -> &FlowNode {
        &self.nodes[n]
    }

    pub fn contains(&self, n: NodeIdx) -> bool {
        self.nodes.get(n).is_some()
    }

    /// The unique incoming control edge of `n`, if any.
    pub fn predecessor(&self, n: NodeIdx) -> Option<NodeIdx> {
        self.nodes[n].predecessor
    }

    pub fn is_join(&self, n: NodeIdx) -> bool {
        matches!(self.nodes[n].kind, NodeKind::Join { .. })
    }

    /// The ordered path tails converging at `n`. Empty for non-joins.
    pub fn incoming_paths(&self, n: NodeIdx) -> &[NodeIdx] {
        match &self.nodes[n].kind {
            NodeKind::Join { tails } => tails,
            _ => &[],
        }
    }

    pub fn is_split(&self, n: NodeIdx) -> bool {
        matches!(self.nodes[n].kind, NodeKind::Split { .. })
    }

    /// The number of outgoing control edges of `n`.
    pub fn successor_count(&self, n: NodeIdx) -> usize {
        match self.nodes[n].kind {
            NodeKind::Split { arms } => arms,
            _ => 1,
        }
    }

    pub(crate) fn add(&mut self, node: FlowNode) -> NodeIdx {
        self.nodes.push(node)
    }

    pub(crate) fn node_mut(&mut self, n: NodeIdx) -> &mut FlowNode {
        &mut self.nodes[n]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIdx, &FlowNode)> {
        self.nodes.iter()
    }
}
