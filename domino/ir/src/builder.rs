//! Builder for incrementally growing a [FlowGraph]. Provides convenience
//! methods to append nodes and validates the single-successor discipline
//! while doing so.
use crate::{FlowGraph, FlowNode, NodeIdx, NodeKind};
use domino_utils::{DominoResult, Error, IndexRef};
use itertools::Itertools;
use smallvec::SmallVec;

/// Append-style builder over a [FlowGraph].
///
/// Every node has a fixed outgoing-edge budget: one for plain nodes and
/// joins, `arms` for splits. The builder tracks how much of each budget has
/// been consumed by downstream nodes and rejects constructions that would
/// give a node more successors than it declared.
pub struct Builder<'a> {
    /// Graph being constructed.
    pub graph: &'a mut FlowGraph,
    /// Outgoing edges consumed so far, indexed by node.
    consumed: Vec<usize>,
}

impl<'a> Builder<'a> {
    /// Instantiate a builder for a graph. The graph may already contain
    /// nodes; their edge budgets are recovered by scanning it.
    pub fn new(graph: &'a mut FlowGraph) -> Self {
        let mut consumed = vec![0; graph.len()];
        for (_, node) in graph.iter() {
            if let Some(pred) = node.predecessor {
                consumed[pred.index()] += 1;
            }
            if let NodeKind::Join { tails } = &node.kind {
                for tail in tails {
                    consumed[tail.index()] += 1;
                }
            }
        }
        Self { graph, consumed }
    }

    /// Add a node that begins the built region: no incoming edge.
    pub fn entry(&mut self) -> NodeIdx {
        self.add(NodeKind::Plain, None)
    }

    /// Append a straight-line node after `pred`.
    pub fn append(&mut self, pred: NodeIdx) -> DominoResult<NodeIdx> {
        self.consume(pred)?;
        Ok(self.add(NodeKind::Plain, Some(pred)))
    }

    /// Append a control split with `arms` outgoing edges after `pred`.
    pub fn append_split(
        &mut self,
        pred: NodeIdx,
        arms: usize,
    ) -> DominoResult<NodeIdx> {
        if arms < 2 {
            return Err(Error::malformed(format!(
                "split must have at least two arms, got {arms}"
            )));
        }
        self.consume(pred)?;
        Ok(self.add(NodeKind::Split { arms }, Some(pred)))
    }

    /// Append a join whose incoming edges come from `tails`, in order.
    pub fn append_join(&mut self, tails: &[NodeIdx]) -> DominoResult<NodeIdx> {
        if tails.is_empty() {
            return Err(Error::malformed("join must have at least one tail"));
        }
        if let Some(dup) = tails.iter().duplicates().next() {
            return Err(Error::malformed(format!(
                "join lists tail {dup} more than once"
            )));
        }
        for &tail in tails {
            self.consume(tail)?;
        }
        Ok(self.add(
            NodeKind::Join {
                tails: SmallVec::from_slice(tails),
            },
            None,
        ))
    }

    /// Attach one more incoming path to an existing join. This is how a join
    /// created with a single transient tail grows as construction proceeds.
    pub fn add_join_tail(
        &mut self,
        join: NodeIdx,
        tail: NodeIdx,
    ) -> DominoResult<()> {
        if !self.graph.is_join(join) {
            return Err(Error::malformed(format!("{join} is not a join")));
        }
        if self.graph.incoming_paths(join).contains(&tail) {
            return Err(Error::malformed(format!(
                "{tail} is already a tail of {join}"
            )));
        }
        self.consume(tail)?;
        match &mut self.graph.node_mut(join).kind {
            NodeKind::Join { tails } => tails.push(tail),
            _ => unreachable!("checked join kind above"),
        }
        Ok(())
    }

    fn add(&mut self, kind: NodeKind, predecessor: Option<NodeIdx>) -> NodeIdx {
        self.consumed.push(0);
        self.graph.add(FlowNode { kind, predecessor })
    }

    // Claim one outgoing edge of `n`.
    fn consume(&mut self, n: NodeIdx) -> DominoResult<()> {
        if !self.graph.contains(n) {
            return Err(Error::malformed(format!("unknown node {n}")));
        }
        let budget = self.graph.successor_count(n);
        let used = &mut self.consumed[n.index()];
        if *used == budget {
            return Err(Error::malformed(format!(
                "{n} already has all {budget} of its successors connected"
            )));
        }
        *used += 1;
        Ok(())
    }
}
