//! Recursive randomized tree growth and single-tree classification.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::dataset::ColumnSet;
use crate::node::{FeatureIndex, Node, NodeIndex, first_arg_max};
use crate::score::split_score;

/// Append a leaf holding `class_freqs` to the arena.
fn push_leaf(arena: &mut Vec<Node>, class_freqs: Vec<usize>) -> NodeIndex {
    let index = arena.len();
    arena.push(Node::Leaf { class_freqs });
    NodeIndex::new(index)
}

/// Recursively grow one extremely randomized tree over `subset`.
///
/// `attr_pool` is the set of attribute indices eligible at this node. At a
/// branch, the non-constant members of the pool are filtered out, up to
/// `num_attr` of them are sampled without replacement, each gets one uniform
/// random threshold on its `[min, max]` range, and the highest-scoring
/// `(attribute, threshold)` pair wins (first maximum under strictly-greater
/// comparison). The recursion hands the *sampled* attribute set down to both
/// children, so the pool shrinks monotonically with depth.
///
/// Returns the [`NodeIndex`] of the node just created in `arena`. The node is
/// appended before its children, giving the arena a pre-order layout.
pub(crate) fn grow_tree(
    cols: &ColumnSet,
    attr_pool: &[usize],
    subset: &[usize],
    n_min: usize,
    num_attr: usize,
    rng: &mut ChaCha8Rng,
    arena: &mut Vec<Node>,
) -> NodeIndex {
    // Class-label histogram of the subset; every stopping rule returns it.
    let mut class_freqs = vec![0usize; cols.n_classes];
    for &i in subset {
        class_freqs[cols.labels[i]] += 1;
    }

    if subset.len() < n_min {
        return push_leaf(arena, class_freqs);
    }

    let nonzero_classes = class_freqs.iter().filter(|&&c| c != 0).count();
    if nonzero_classes == 1 {
        return push_leaf(arena, class_freqs);
    }

    // Attribute ranges over the subset; constants drop out of the pool.
    let mut candidates: Vec<(usize, f32, f32)> = Vec::with_capacity(attr_pool.len());
    for &attr in attr_pool {
        let column = &cols.columns[attr];
        let mut min = column[subset[0]];
        let mut max = min;
        for &i in &subset[1..] {
            let value = column[i];
            if value < min {
                min = value;
            } else if value > max {
                max = value;
            }
        }
        if min < max {
            candidates.push((attr, min, max));
        }
    }

    if candidates.is_empty() {
        return push_leaf(arena, class_freqs);
    }

    // Sample without replacement: swap-pop until num_attr are drawn.
    let sampled = if candidates.len() <= num_attr {
        candidates
    } else {
        let mut remaining = candidates;
        let mut picked = Vec::with_capacity(num_attr);
        for _ in 0..num_attr {
            let target = rng.gen_range(0..remaining.len());
            picked.push(remaining.swap_remove(target));
        }
        picked
    };

    // One uniform random threshold per sampled attribute; keep the best.
    let mut best_attr = sampled[0].0;
    let mut best_split = 0.0f32;
    let mut best_score = -1.0f64;
    for &(attr, min, max) in &sampled {
        let split = rng.gen_range(min..=max);
        let score = split_score(&cols.columns[attr], &cols.labels, cols.n_classes, subset, split);
        if score > best_score {
            best_attr = attr;
            best_split = split;
            best_score = score;
        }
    }

    let column = &cols.columns[best_attr];
    let mut left_subset = Vec::new();
    let mut right_subset = Vec::new();
    for &i in subset {
        if column[i] < best_split {
            left_subset.push(i);
        } else {
            right_subset.push(i);
        }
    }

    // A threshold drawn exactly at the subset minimum routes everything
    // right; recursing would not shrink the subset, so stop here.
    if left_subset.is_empty() || right_subset.is_empty() {
        return push_leaf(arena, class_freqs);
    }

    let child_pool: Vec<usize> = sampled.iter().map(|&(attr, _, _)| attr).collect();

    // Arena pattern: reserve the parent slot, recurse, then overwrite.
    let node_index = arena.len();
    arena.push(Node::Leaf { class_freqs });

    let left = grow_tree(cols, &child_pool, &left_subset, n_min, num_attr, rng, arena);
    let right = grow_tree(cols, &child_pool, &right_subset, n_min, num_attr, rng, arena);

    arena[node_index] = Node::Branch {
        feature: FeatureIndex::new(best_attr),
        split: best_split,
        left,
        right,
    };

    NodeIndex::new(node_index)
}

/// One extremely randomized decision tree.
///
/// Stored as an arena `Vec<Node>` in pre-order with the root at index 0;
/// children are referenced by [`NodeIndex`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Wrap an arena produced by the builder or the model reader.
    pub(crate) fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Return the node arena.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Classify one feature vector, returning the dense label index.
    ///
    /// Walks from the root following the strict `< split` rule (ties go
    /// right) and returns the index of the reached leaf's most frequent
    /// class bucket, lowest index winning ties.
    #[must_use]
    pub fn classify(&self, example: &[f32]) -> usize {
        match &self.nodes[self.traverse(example)] {
            Node::Leaf { class_freqs } => first_arg_max(class_freqs),
            Node::Branch { .. } => unreachable!("traverse always ends at a leaf"),
        }
    }

    /// Walk from the root and return the arena index of the reached leaf.
    pub(crate) fn traverse(&self, example: &[f32]) -> usize {
        let mut index = 0usize;
        loop {
            match &self.nodes[index] {
                Node::Leaf { .. } => return index,
                Node::Branch {
                    feature,
                    split,
                    left,
                    right,
                } => {
                    index = if example[feature.index()] < *split {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }

    /// Return the total number of nodes (branches and leaves).
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree; a lone root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0usize;
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((0usize, 0usize));
        while let Some((index, depth)) = queue.pop_front() {
            match &self.nodes[index] {
                Node::Leaf { .. } => max_depth = max_depth.max(depth),
                Node::Branch { left, right, .. } => {
                    queue.push_back((left.index(), depth + 1));
                    queue.push_back((right.index(), depth + 1));
                }
            }
        }
        max_depth
    }
}
