//! Path labels: per-query bookkeeping of which originating paths are known
//! to reach each visited node.
//!
//! Every label is a lattice element that only ever grows: path-identifier
//! bits get added when a new distinguishable path is discovered or when
//! information from a sibling path arrives late, and are never removed. The
//! labels form a DAG through their parent/child handle lists, which is how
//! late information ripples to labels that were already walked.

use domino_ir::NodeIdx;
use domino_utils::{IndexedMap, impl_index};
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use smallvec::{SmallVec, smallvec};
use std::fmt;

/// Handle for a [PathLabel] inside a [LabelStore].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(super) struct LabelIdx(u32);
impl_index!(LabelIdx);

/// A growable set of path-identifier bits.
///
/// Stored as little-endian `u64` words with the invariant that the last word
/// is never zero, so derived equality is structural equality.
#[derive(Clone, Default, PartialEq, Eq)]
pub(super) struct PathSet {
    words: SmallVec<[u64; 1]>,
}

impl PathSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(bit: u32) -> (usize, u64) {
        ((bit / 64) as usize, 1u64 << (bit % 64))
    }

    /// Set `bit`; returns whether it was newly set.
    pub fn insert(&mut self, bit: u32) -> bool {
        let (word, mask) = Self::slot(bit);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        let newly = self.words[word] & mask == 0;
        self.words[word] |= mask;
        newly
    }

    pub fn contains(&self, bit: u32) -> bool {
        let (word, mask) = Self::slot(bit);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Union `other` into `self`; returns whether `self` grew.
    pub fn union_with(&mut self, other: &PathSet) -> bool {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        let mut grew = false;
        for (i, &w) in other.words.iter().enumerate() {
            let merged = self.words[i] | w;
            if merged != self.words[i] {
                self.words[i] = merged;
                grew = true;
            }
        }
        grew
    }

    /// The bits of `self` that are not in `other`.
    pub fn without(&self, other: &PathSet) -> PathSet {
        let mut words: SmallVec<[u64; 1]> = self
            .words
            .iter()
            .enumerate()
            .map(|(i, &w)| w & !other.words.get(i).copied().unwrap_or(0))
            .collect();
        while words.last() == Some(&0) {
            words.pop();
        }
        PathSet { words }
    }

    /// Clear every bit that is set in `other`.
    pub fn remove_all(&mut self, other: &PathSet) {
        for (i, &w) in other.words.iter().enumerate() {
            if let Some(own) = self.words.get_mut(i) {
                *own &= !w;
            }
        }
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..64u32)
                .filter(move |b| w & (1 << b) != 0)
                .map(move |b| i as u32 * 64 + b)
        })
    }
}

impl fmt::Debug for PathSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.iter().map(|b| b.to_string()).join(", "))
    }
}

/// One node's view of the paths that reach it, for the duration of a single
/// dominator query.
#[derive(Debug)]
pub(super) struct PathLabel {
    /// The node this label is attached to.
    pub node: NodeIdx,
    /// All path-identifier bits known to reach [PathLabel::node]. Grows
    /// monotonically.
    pub bits: PathSet,
    /// The subset of `bits` first allocated at this label or one of its
    /// descendants' divergence points below it.
    pub own_bits: PathSet,
    /// Labels derived from this one further up the walk.
    pub children: SmallVec<[LabelIdx; 2]>,
    /// Labels this one was derived from or aggregated out of.
    pub parents: SmallVec<[LabelIdx; 2]>,
    /// Whether the walk already continued past this label's node carrying
    /// this label. Consulted for split aggregates to decide between
    /// re-queueing and back-propagation.
    pub explored: bool,
}

struct Entry {
    label: LabelIdx,
    /// The label the chain walk starting at this node carried, if it already
    /// ran. This is the scheduler's idempotence guard and is distinct from
    /// [PathLabel::explored]: a split aggregate can sit on a predecessor
    /// node whose own walk has not happened yet. It records the label rather
    /// than a flag because a split upstream may replace the node's label
    /// with its aggregate, and the new label deserves a walk of its own.
    walked: Option<LabelIdx>,
}

/// Per-query arena of path labels plus the node bookkeeping around them.
/// Created fresh for each query and dropped with it; path-identifier bits
/// are never shared across queries.
pub(super) struct LabelStore {
    labels: IndexedMap<LabelIdx, PathLabel>,
    /// Walk label attached to each node, in attachment order.
    entries: LinkedHashMap<NodeIdx, Entry>,
    /// Aggregate labels lazily created for visited splits.
    aggregates: LinkedHashMap<NodeIdx, LabelIdx>,
    /// Next fresh path-identifier bit. Bit 0 is reserved for the target.
    next_bit: u32,
}

impl LabelStore {
    pub fn new() -> Self {
        Self {
            labels: IndexedMap::new(),
            entries: LinkedHashMap::new(),
            aggregates: LinkedHashMap::new(),
            next_bit: 1,
        }
    }

    /// Build the full label for the query target and attach it to `node`.
    /// It owns the reserved bit 0; its `bits` are the target set.
    pub fn alloc_root(&mut self, node: NodeIdx) -> LabelIdx {
        let mut bits = PathSet::new();
        bits.insert(0);
        let root = self.labels.push(PathLabel {
            node,
            bits: bits.clone(),
            own_bits: bits,
            children: SmallVec::new(),
            parents: SmallVec::new(),
            explored: false,
        });
        self.attach(node, root);
        root
    }

    pub fn label(&self, l: LabelIdx) -> &PathLabel {
        &self.labels[l]
    }

    /// Derive a new label from `parent` and attach it to `at_node`.
    ///
    /// The first, lone continuation of a label keeps its parent's identity
    /// and consumes no bits. Any second or subsequent branch taken from the
    /// same label, and any branch taken from a label with no identity of its
    /// own (an aggregate), is a genuine divergence for the purposes of the
    /// query and gets a fresh path-identifier bit. The fresh bit also flows
    /// into every ancestor so the target set learns that one more
    /// distinguishable path exists.
    pub fn create_child(
        &mut self,
        parent: LabelIdx,
        at_node: NodeIdx,
    ) -> LabelIdx {
        let (parent_bits, parent_own, diverges) = {
            let p = &self.labels[parent];
            (p.bits.clone(), p.own_bits.clone(), !p.children.is_empty())
        };
        let mut bits = parent_bits;
        let mut own_bits = parent_own.clone();
        if diverges || parent_own.is_empty() {
            let fresh = self.fresh_bit();
            bits.remove_all(&parent_own);
            bits.insert(fresh);
            own_bits = PathSet::new();
            own_bits.insert(fresh);
            self.propagate_fresh(parent, fresh);
        }
        let child = self.labels.push(PathLabel {
            node: at_node,
            bits,
            own_bits,
            children: SmallVec::new(),
            parents: smallvec![parent],
            explored: false,
        });
        self.labels[parent].children.push(child);
        self.attach(at_node, child);
        child
    }

    // Push a freshly allocated bit into `label` and all of its ancestors.
    // Ancestors that already carry the bit terminate the climb.
    fn propagate_fresh(&mut self, label: LabelIdx, bit: u32) {
        if !self.labels[label].own_bits.insert(bit) {
            return;
        }
        self.labels[label].bits.insert(bit);
        let parents = self.labels[label].parents.clone();
        for parent in parents {
            self.propagate_fresh(parent, bit);
        }
    }

    /// Merge `src` into `dst`.
    ///
    /// With `as_parent` set this records `src` as a parent of `dst` and
    /// unions everything `src` knows into `dst`; it always reports progress.
    /// Otherwise it is a peer merge: only bits that `src` did not introduce
    /// purely for itself may flow over, and progress is reported only when
    /// `dst` actually learned something new.
    pub fn merge_from(
        &mut self,
        dst: LabelIdx,
        src: LabelIdx,
        as_parent: bool,
    ) -> bool {
        if as_parent {
            self.labels[dst].parents.push(src);
            self.labels[src].children.push(dst);
            let src_bits = self.labels[src].bits.clone();
            self.labels[dst].bits.union_with(&src_bits);
            true
        } else {
            let delta = {
                let src_label = &self.labels[src];
                let dst_label = &self.labels[dst];
                src_label
                    .bits
                    .without(&dst_label.bits)
                    .without(&src_label.own_bits)
            };
            if delta.is_empty() {
                return false;
            }
            self.labels[dst].bits.union_with(&delta);
            true
        }
    }

    /// Whether `l`'s bits equal the target set.
    pub fn covers_target(&self, l: LabelIdx, target: LabelIdx) -> bool {
        self.labels[l].bits == self.labels[target].bits
    }

    /// Attach `label` as the walk label of `node`, keeping any walk state
    /// the node already accumulated.
    pub fn attach(&mut self, node: NodeIdx, label: LabelIdx) {
        match self.entries.get_mut(&node) {
            Some(entry) => entry.label = label,
            None => {
                self.entries.insert(
                    node,
                    Entry {
                        label,
                        walked: None,
                    },
                );
            }
        }
    }

    pub fn label_at(&self, node: NodeIdx) -> Option<LabelIdx> {
        self.entries.get(&node).map(|e| e.label)
    }

    /// Whether the chain walk from `node` already ran carrying the label the
    /// node currently holds. A node whose label was replaced since its last
    /// walk needs walking again.
    pub fn walk_consumed(&self, node: NodeIdx) -> bool {
        self.entries
            .get(&node)
            .is_some_and(|e| e.walked == Some(e.label))
    }

    pub fn mark_walked(&mut self, node: NodeIdx) {
        if let Some(entry) = self.entries.get_mut(&node) {
            entry.walked = Some(entry.label);
        }
    }

    pub fn set_label_explored(&mut self, l: LabelIdx) {
        self.labels[l].explored = true;
    }

    /// The aggregate label of `split`, created empty on first use. An
    /// aggregate starts with no bits at all: it has no identity of its own
    /// and only accumulates what its arms deliver.
    pub fn aggregate_for(&mut self, split: NodeIdx) -> LabelIdx {
        if let Some(&l) = self.aggregates.get(&split) {
            return l;
        }
        let l = self.labels.push(PathLabel {
            node: split,
            bits: PathSet::new(),
            own_bits: PathSet::new(),
            children: SmallVec::new(),
            parents: SmallVec::new(),
            explored: false,
        });
        self.aggregates.insert(split, l);
        l
    }

    pub fn fresh_bit(&mut self) -> u32 {
        let bit = self.next_bit;
        self.next_bit += 1;
        bit
    }

    #[cfg(test)]
    pub fn iter_labels(&self) -> impl Iterator<Item = (LabelIdx, &PathLabel)> {
        self.labels.iter()
    }

    /// Render the label map for postmortem diagnosis.
    pub fn dump(&self) -> String {
        let entries = self.entries.iter().map(|(node, entry)| {
            let l = &self.labels[entry.label];
            format!(
                "  {node}: bits {:?} own {:?}{}",
                l.bits,
                l.own_bits,
                if entry.walked.is_some() { " walked" } else { "" }
            )
        });
        let aggregates = self.aggregates.iter().map(|(split, &idx)| {
            let l = &self.labels[idx];
            format!(
                "  split {split}: bits {:?} ({} arms reported){}",
                l.bits,
                l.parents.len(),
                if l.explored { " continued" } else { "" }
            )
        });
        entries.chain(aggregates).join("\n")
    }
}
