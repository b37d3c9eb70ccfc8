//! The upward-walk scheduler and the query entry point.

use super::DominatorError;
use super::path_label::{LabelIdx, LabelStore};
use domino_ir::{FlowGraph, NodeIdx};
use smallvec::SmallVec;
use std::collections::VecDeque;

/// Answers a single immediate-dominator query against a graph under
/// construction. One instance serves exactly one query; see the module docs
/// for the algorithm.
pub struct DominatorResolver<'g> {
    graph: &'g FlowGraph,
    store: LabelStore,
    /// Walk continuations known safe to take.
    ready: VecDeque<NodeIdx>,
    /// Continuations past splits that have not heard from every arm yet.
    deferred: VecDeque<NodeIdx>,
    /// The full label attached to the queried join. Its bits are the target
    /// set.
    target: LabelIdx,
    answer: Option<NodeIdx>,
}

impl<'g> DominatorResolver<'g> {
    /// Compute the immediate dominator of `join`.
    ///
    /// `join` must be a join point of `graph`; the graph must not change for
    /// the duration of the call. Fails with
    /// [DominatorError::UnresolvableDominator] when no single ancestor
    /// reachable through the built region covers every path into `join`.
    pub fn resolve(
        graph: &'g FlowGraph,
        join: NodeIdx,
    ) -> Result<NodeIdx, DominatorError> {
        debug_assert!(graph.is_join(join), "dominator query on a non-join");
        let mut resolver = Self::new(graph, join);
        resolver.run(join)
    }

    fn new(graph: &'g FlowGraph, join: NodeIdx) -> Self {
        let mut store = LabelStore::new();
        let target = store.alloc_root(join);
        Self {
            graph,
            store,
            ready: VecDeque::new(),
            deferred: VecDeque::new(),
            target,
            answer: None,
        }
    }

    fn run(&mut self, join: NodeIdx) -> Result<NodeIdx, DominatorError> {
        log::debug!("resolving immediate dominator of {join}");
        self.process_join(join, self.target);

        // A join with a single incoming path is trivially dominated by its
        // tail; no walking required.
        if let [tail] = self.graph.incoming_paths(join) {
            log::debug!("single incoming path, dominator is {tail}");
            return Ok(*tail);
        }

        while self.answer.is_none() {
            if let Some(node) = self.ready.pop_front() {
                self.explore(node);
                continue;
            }
            // Ready ran dry: take exactly one speculative continuation, then
            // give ready priority again.
            match self.deferred.pop_front() {
                Some(node) => self.explore(node),
                None => break,
            }
        }

        match self.answer {
            Some(idom) => {
                log::debug!("immediate dominator of {join} is {idom}");
                Ok(idom)
            }
            None => Err(DominatorError::UnresolvableDominator {
                join,
                labels: self.store.dump(),
            }),
        }
    }

    /// Walk the single-predecessor chain upward from `node` until a join or
    /// split takes over. Revisiting a node is a no-op unless a split
    /// upstream replaced its label with an aggregate since the last walk;
    /// the new label then has to be carried onward too. Re-walking is safe:
    /// the chain ends at the first join or split, and both merge into
    /// existing labels rather than stacking new ones.
    fn explore(&mut self, node: NodeIdx) {
        if self.store.walk_consumed(node) {
            return;
        }
        self.store.mark_walked(node);
        let label = self.store.label_at(node).unwrap_or_else(|| {
            unreachable!("queued node {node} has no label")
        });
        // Record that this label's information has been carried onward; for
        // a split aggregate this is what later arrivals key off to
        // back-propagate instead of re-queueing.
        self.store.set_label_explored(label);
        log::trace!("walking up from {node}");

        let mut cur = node;
        loop {
            if self.graph.is_join(cur) {
                self.process_join(cur, label);
                return;
            }
            if self.graph.is_split(cur) {
                self.process_split(cur, label);
                return;
            }
            match self.graph.predecessor(cur) {
                Some(pred) => cur = pred,
                // The path ends at the region boundary with nothing learned.
                None => return,
            }
        }
    }

    /// A join reached on the way up is treated exactly like the query
    /// target: every one of its incoming paths must be explored too.
    fn process_join(&mut self, join: NodeIdx, incoming: LabelIdx) {
        for &tail in self.graph.incoming_paths(join) {
            match self.store.label_at(tail) {
                None => {
                    self.store.create_child(incoming, tail);
                    self.ready.push_back(tail);
                }
                // The tail was labeled by an earlier pass through this
                // join (possible once a back edge closed a loop in the
                // built region): fold the new arrival into the existing
                // label instead of stacking a second one.
                Some(existing) => {
                    self.store.merge_from(existing, incoming, true);
                    if self.store.covers_target(existing, self.target) {
                        self.answer = Some(tail);
                        return;
                    }
                    if self.store.walk_consumed(tail) {
                        self.propagate_update(existing);
                        if self.answer.is_some() {
                            return;
                        }
                    } else {
                        self.ready.push_back(tail);
                    }
                }
            }
        }
    }

    /// Fold an arriving arm into the split's aggregate and decide whether it
    /// is safe to continue past the split yet.
    fn process_split(&mut self, split: NodeIdx, incoming: LabelIdx) {
        let agg = self.store.aggregate_for(split);
        self.store.merge_from(agg, incoming, true);

        if self.store.covers_target(agg, self.target) {
            log::debug!("split {split} covers the full path set");
            self.answer = Some(split);
            return;
        }

        if self.store.label(agg).explored {
            // The walk already continued past this split; ripple the new
            // bits through the label graph instead of walking edges again.
            self.propagate_update(agg);
            return;
        }

        let Some(pred) = self.graph.predecessor(split) else {
            // Region boundary; the aggregate can still become the answer
            // once the remaining arms report in.
            return;
        };
        // Point the predecessor at the aggregate either way, so whichever
        // queue visit happens sees the latest state.
        self.store.attach(pred, agg);

        let reported = self.store.label(agg).parents.len();
        let arms = self.graph.successor_count(split);
        log::trace!("split {split}: {reported}/{arms} arms reported");
        // An arm may report twice with distinct labels once re-walks start
        // handing aggregates around, hence `>=`.
        if reported >= arms {
            // Every arm has been heard from at least once: continuing is
            // safe, so promote the continuation out of the speculative tier.
            self.store.set_label_explored(agg);
            self.deferred.retain(|n| *n != pred);
            self.ready.push_back(pred);
        } else if !self.deferred.contains(&pred) {
            self.deferred.push_back(pred);
        }
    }

    /// Ripple bits that arrived late at `label` down through its children
    /// without re-walking graph edges. Recursion depth is bounded by the
    /// join/split nesting of the walked region.
    fn propagate_update(&mut self, label: LabelIdx) {
        let children: SmallVec<[LabelIdx; 2]> =
            self.store.label(label).children.clone();
        for child in children {
            if self.answer.is_some() {
                return;
            }
            if self.store.merge_from(child, label, false) {
                if self.store.covers_target(child, self.target) {
                    let node = self.store.label(child).node;
                    log::debug!("{node} covers the full path set");
                    self.answer = Some(node);
                    return;
                }
                self.propagate_update(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domino_ir::{Builder, FlowGraph};

    /// entry -> x -> join([x])
    fn single_path_graph() -> (FlowGraph, NodeIdx, NodeIdx) {
        let mut graph = FlowGraph::new();
        let mut b = Builder::new(&mut graph);
        let entry = b.entry();
        let x = b.append(entry).unwrap();
        let join = b.append_join(&[x]).unwrap();
        (graph, x, join)
    }

    /// entry -> split -> {a, b} -> join, with `pad` plain nodes on each arm.
    fn diamond(pad: usize) -> (FlowGraph, NodeIdx, NodeIdx) {
        let mut graph = FlowGraph::new();
        let mut b = Builder::new(&mut graph);
        let entry = b.entry();
        let split = b.append_split(entry, 2).unwrap();
        let mut a = b.append(split).unwrap();
        let mut c = b.append(split).unwrap();
        for _ in 0..pad {
            a = b.append(a).unwrap();
            c = b.append(c).unwrap();
        }
        let join = b.append_join(&[a, c]).unwrap();
        (graph, split, join)
    }

    struct Nested {
        graph: FlowGraph,
        outer_split: NodeIdx,
        inner_pred: NodeIdx,
        inner_tails: Vec<NodeIdx>,
        outer_tails: Vec<NodeIdx>,
        join: NodeIdx,
    }

    /// A diamond nested in one arm of another diamond, with `inner_arms`
    /// arms on the inner split:
    ///
    /// entry -> S1; S1 -> x -> S2 -> {c_i} -> J2 -> t1; S1 -> t2;
    /// {t1, t2} -> J
    fn nested(inner_arms: usize) -> Nested {
        let mut graph = FlowGraph::new();
        let mut b = Builder::new(&mut graph);
        let entry = b.entry();
        let outer_split = b.append_split(entry, 2).unwrap();
        let inner_pred = b.append(outer_split).unwrap();
        let inner_split = b.append_split(inner_pred, inner_arms).unwrap();
        let inner_tails: Vec<_> = (0..inner_arms)
            .map(|_| b.append(inner_split).unwrap())
            .collect();
        let inner_join = b.append_join(&inner_tails).unwrap();
        let t1 = b.append(inner_join).unwrap();
        let t2 = b.append(outer_split).unwrap();
        let join = b.append_join(&[t1, t2]).unwrap();
        Nested {
            graph,
            outer_split,
            inner_pred,
            inner_tails,
            outer_tails: vec![t1, t2],
            join,
        }
    }

    #[test]
    fn single_predecessor_returns_tail() {
        // The upstream region dead-ends, so any walk would fail; a correct
        // fast path never walks at all.
        let (graph, x, join) = single_path_graph();
        assert_eq!(DominatorResolver::resolve(&graph, join).unwrap(), x);
    }

    #[test]
    fn simple_diamond() {
        let (graph, split, join) = diamond(0);
        assert_eq!(DominatorResolver::resolve(&graph, join).unwrap(), split);
    }

    #[test]
    fn chain_transparency() {
        for pad in [1, 2, 7] {
            let (graph, split, join) = diamond(pad);
            assert_eq!(
                DominatorResolver::resolve(&graph, join).unwrap(),
                split
            );
        }
    }

    #[test]
    fn nested_diamonds() {
        let n = nested(2);
        assert_eq!(
            DominatorResolver::resolve(&n.graph, n.join).unwrap(),
            n.outer_split
        );
    }

    #[test]
    fn split_listed_directly_as_a_join_tail() {
        // One arm of the split feeds the join with no node in between, so
        // the split is walked early with its seed label and must be walked
        // again once the inner diamond hands it an aggregate.
        //
        // entry -> p; p -> s; s -> {a, c} -> j1 -> t; join([p, t])
        let mut graph = FlowGraph::new();
        let mut b = Builder::new(&mut graph);
        let entry = b.entry();
        let p = b.append_split(entry, 2).unwrap();
        let s = b.append_split(p, 2).unwrap();
        let a = b.append(s).unwrap();
        let c = b.append(s).unwrap();
        let j1 = b.append_join(&[a, c]).unwrap();
        let t = b.append(j1).unwrap();
        let join = b.append_join(&[p, t]).unwrap();
        assert_eq!(DominatorResolver::resolve(&graph, join).unwrap(), p);
    }

    #[test]
    fn split_listed_as_an_interior_join_tail() {
        // Same shape one level down: the bare split arm feeds an interior
        // join, and the whole figure sits inside one arm of an outer
        // diamond.
        //
        // entry -> o; o -> p; p -> c; j1 = join([p, c]); j1 -> t1;
        // o -> t2; join([t1, t2])
        let mut graph = FlowGraph::new();
        let mut b = Builder::new(&mut graph);
        let entry = b.entry();
        let o = b.append_split(entry, 2).unwrap();
        let p = b.append_split(o, 2).unwrap();
        let c = b.append(p).unwrap();
        let j1 = b.append_join(&[p, c]).unwrap();
        let t1 = b.append(j1).unwrap();
        let t2 = b.append(o).unwrap();
        let join = b.append_join(&[t1, t2]).unwrap();
        assert_eq!(DominatorResolver::resolve(&graph, join).unwrap(), o);
    }

    #[test]
    fn transient_single_tail_join_grows() {
        let mut graph = FlowGraph::new();
        let mut b = Builder::new(&mut graph);
        let entry = b.entry();
        let split = b.append_split(entry, 2).unwrap();
        let a = b.append(split).unwrap();
        let join = b.append_join(&[a]).unwrap();
        assert_eq!(DominatorResolver::resolve(&graph, join).unwrap(), a);

        // Construction proceeds: the second arm arrives.
        let mut b = Builder::new(&mut graph);
        let c = b.append(split).unwrap();
        b.add_join_tail(join, c).unwrap();
        assert_eq!(DominatorResolver::resolve(&graph, join).unwrap(), split);
    }

    #[test]
    fn split_waits_for_every_arm() {
        let n = nested(3);
        let mut r = DominatorResolver::new(&n.graph, n.join);
        r.process_join(n.join, r.target);

        // Walk the arm containing the inner diamond; its join spawns the
        // inner tails.
        r.explore(n.outer_tails[0]);
        assert!(r.ready.contains(&n.inner_tails[0]));

        // Two of three inner arms report: continuing past the inner split
        // stays speculative.
        r.explore(n.inner_tails[0]);
        r.explore(n.inner_tails[1]);
        assert!(r.deferred.contains(&n.inner_pred));
        assert!(!r.ready.contains(&n.inner_pred));
        assert!(r.answer.is_none());
        // Arriving arms must not pile up duplicate speculative entries.
        assert_eq!(
            r.deferred.iter().filter(|&&d| d == n.inner_pred).count(),
            1
        );

        // The last arm arrives: the continuation is promoted to ready and
        // the stale speculative entry disappears.
        r.explore(n.inner_tails[2]);
        assert!(r.ready.contains(&n.inner_pred));
        assert!(!r.deferred.contains(&n.inner_pred));
        assert!(r.answer.is_none());

        // Finishing the walk finds the outer split.
        r.explore(n.outer_tails[1]);
        r.explore(n.inner_pred);
        assert_eq!(r.answer, Some(n.outer_split));
    }

    #[test]
    fn revisiting_an_explored_node_is_a_noop() {
        let (graph, _, join) = diamond(0);
        let tails: Vec<_> = graph.incoming_paths(join).to_vec();
        let mut r = DominatorResolver::new(&graph, join);
        r.process_join(join, r.target);
        let seeded = r.ready.len();

        r.explore(tails[0]);
        let labels = r.store.iter_labels().count();
        let ready = r.ready.len();
        let deferred = r.deferred.clone();

        r.explore(tails[0]);
        assert_eq!(r.store.iter_labels().count(), labels);
        assert_eq!(r.ready.len(), ready);
        assert_eq!(r.deferred, deferred);
        assert!(r.answer.is_none());
        assert_eq!(seeded, 2);
    }

    #[test]
    fn unresolvable_graph_is_reported() {
        // Two entries with no common ancestor feed the join.
        let mut graph = FlowGraph::new();
        let mut b = Builder::new(&mut graph);
        let e1 = b.entry();
        let e2 = b.entry();
        let a = b.append(e1).unwrap();
        let c = b.append(e2).unwrap();
        let join = b.append_join(&[a, c]).unwrap();

        match DominatorResolver::resolve(&graph, join) {
            Err(DominatorError::UnresolvableDominator { join: j, labels }) => {
                assert_eq!(j, join);
                assert!(!labels.is_empty());
            }
            other => panic!("expected unresolvable dominator, got {other:?}"),
        }
    }

    #[test]
    fn bits_grow_monotonically() {
        let n = nested(2);
        let mut r = DominatorResolver::new(&n.graph, n.join);
        r.process_join(n.join, r.target);

        let mut seen: Vec<(super::LabelIdx, Vec<u32>)> = Vec::new();
        let mut check = |r: &DominatorResolver| {
            let mut next = Vec::new();
            for (idx, label) in r.store.iter_labels() {
                let bits: Vec<u32> = label.bits.iter().collect();
                if let Some((_, old)) =
                    seen.iter().find(|(prev, _)| *prev == idx)
                {
                    for bit in old {
                        assert!(
                            bits.contains(bit),
                            "label lost bit {bit} during the query"
                        );
                    }
                }
                next.push((idx, bits));
            }
            seen = next;
        };

        check(&r);
        while r.answer.is_none() {
            let node = match r.ready.pop_front() {
                Some(node) => node,
                None => match r.deferred.pop_front() {
                    Some(node) => node,
                    None => break,
                },
            };
            r.explore(node);
            check(&r);
        }
        assert_eq!(r.answer, Some(n.outer_split));
    }
}
