//! Ensemble growth and majority-vote classification.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument};

use crate::config::ExtraTreesConfig;
use crate::dataset::{ColumnSet, ExampleSet};
use crate::error::EtError;
use crate::node::first_arg_max;
use crate::tree::{DecisionTree, grow_tree};

/// A grown Extra-Trees ensemble.
///
/// Owns its trees and the canonical index-to-label map. Frozen after
/// growth: classification and serialization never mutate it.
#[derive(Debug, Clone, PartialEq)]
pub struct Forest {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) index_to_label: Vec<i32>,
    pub(crate) n_features: usize,
}

/// Grow the ensemble described by `config` over `examples`.
///
/// Pivots the example set to attribute-major form once, then grows
/// `num_trees` trees sequentially off one generator stream. Every tree sees
/// the full example set and the full attribute pool.
#[instrument(skip_all, fields(num_trees = config.num_trees, n_examples = examples.n_examples()))]
pub(crate) fn train(config: &ExtraTreesConfig, examples: &ExampleSet) -> Result<Forest, EtError> {
    if examples.n_examples() == 0 {
        return Err(EtError::EmptyDataset);
    }
    let n_features = examples.n_features();
    if n_features == 0 {
        return Err(EtError::ZeroFeatures);
    }
    if config.n_min == 0 {
        return Err(EtError::InvalidNMin { n_min: 0 });
    }
    let num_attr = config.num_attr.resolve(n_features)?;

    info!(
        num_trees = config.num_trees,
        n_min = config.n_min,
        num_attr,
        n_features,
        n_classes = examples.n_classes(),
        "growing extra-trees ensemble"
    );

    let cols = ColumnSet::from_examples(examples);
    let attr_pool: Vec<usize> = (0..n_features).collect();
    let subset: Vec<usize> = (0..examples.n_examples()).collect();

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut trees = Vec::with_capacity(config.num_trees);
    for _ in 0..config.num_trees {
        let mut arena = Vec::new();
        grow_tree(
            &cols,
            &attr_pool,
            &subset,
            config.n_min,
            num_attr,
            &mut rng,
            &mut arena,
        );
        trees.push(DecisionTree::from_nodes(arena));
    }

    debug!(
        n_trees = trees.len(),
        total_nodes = trees.iter().map(DecisionTree::n_nodes).sum::<usize>(),
        "ensemble grown"
    );

    Ok(Forest {
        trees,
        index_to_label: cols.label_values,
        n_features,
    })
}

impl Forest {
    /// Assemble a forest from parts already validated by the model reader.
    pub(crate) fn from_parts(
        trees: Vec<DecisionTree>,
        index_to_label: Vec<i32>,
        n_features: usize,
    ) -> Self {
        Self {
            trees,
            index_to_label,
            n_features,
        }
    }

    /// Classify one feature vector by majority vote over the per-tree votes.
    ///
    /// Each tree contributes the majority class of the leaf it routes the
    /// example to; the forest returns the label whose vote count is highest,
    /// lowest dense index winning ties.
    ///
    /// # Errors
    ///
    /// Returns [`EtError::ClassifyFeatureMismatch`] when `example.len()`
    /// differs from the feature count the forest was grown on.
    pub fn classify(&self, example: &[f32]) -> Result<i32, EtError> {
        if example.len() != self.n_features {
            return Err(EtError::ClassifyFeatureMismatch {
                expected: self.n_features,
                got: example.len(),
            });
        }
        let mut votes = vec![0usize; self.index_to_label.len()];
        for tree in &self.trees {
            votes[tree.classify(example)] += 1;
        }
        Ok(self.index_to_label[first_arg_max(&votes)])
    }

    /// Classify one feature vector through a single tree of the ensemble.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`EtError::InvalidTreeIndex`] | `tree_index >= n_trees` |
    /// | [`EtError::ClassifyFeatureMismatch`] | wrong feature count |
    pub fn classify_tree(&self, tree_index: usize, example: &[f32]) -> Result<i32, EtError> {
        let tree = self.trees.get(tree_index).ok_or(EtError::InvalidTreeIndex {
            tree_index,
            n_trees: self.trees.len(),
        })?;
        if example.len() != self.n_features {
            return Err(EtError::ClassifyFeatureMismatch {
                expected: self.n_features,
                got: example.len(),
            });
        }
        Ok(self.index_to_label[tree.classify(example)])
    }

    /// Classification accuracy of the whole forest over `examples`.
    ///
    /// # Errors
    ///
    /// Returns [`EtError::EmptyDataset`] when `examples` is empty, or a
    /// classification error for malformed rows.
    pub fn accuracy(&self, examples: &ExampleSet) -> Result<f64, EtError> {
        if examples.n_examples() == 0 {
            return Err(EtError::EmptyDataset);
        }
        let mut correct = 0usize;
        for (row, &label) in examples.features().iter().zip(examples.labels()) {
            correct += usize::from(self.classify(row)? == label);
        }
        Ok(correct as f64 / examples.n_examples() as f64)
    }

    /// Classification accuracy of one tree over `examples`.
    ///
    /// # Errors
    ///
    /// Same as [`Forest::classify_tree`], plus [`EtError::EmptyDataset`].
    pub fn tree_accuracy(&self, tree_index: usize, examples: &ExampleSet) -> Result<f64, EtError> {
        if examples.n_examples() == 0 {
            return Err(EtError::EmptyDataset);
        }
        let mut correct = 0usize;
        for (row, &label) in examples.features().iter().zip(examples.labels()) {
            correct += usize::from(self.classify_tree(tree_index, row)? == label);
        }
        Ok(correct as f64 / examples.n_examples() as f64)
    }

    /// Return the trees of the ensemble.
    #[must_use]
    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Return the canonical index-to-label map.
    #[must_use]
    pub fn label_values(&self) -> &[i32] {
        &self.index_to_label
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.index_to_label.len()
    }

    /// Return the number of features the forest was grown on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{ExtraTreesConfig, NumAttr};
    use crate::dataset::ExampleSet;
    use crate::error::EtError;

    fn make_set(features: Vec<Vec<f32>>, labels: Vec<i32>) -> ExampleSet {
        let n_features = features.first().map_or(0, Vec::len);
        let names = (0..n_features).map(|j| format!("f{j}")).collect();
        ExampleSet::new("y".to_string(), names, vec![], features, labels).unwrap()
    }

    /// Two well-separated classes on the first feature.
    fn make_separable() -> ExampleSet {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            features.push(vec![i as f32 * 0.1, 0.5]);
            labels.push(0);
        }
        for i in 0..20 {
            features.push(vec![10.0 + i as f32 * 0.1, 0.5]);
            labels.push(1);
        }
        make_set(features, labels)
    }

    #[test]
    fn separable_two_feature_training_set_memorized() {
        // Four distinct rows, two classes split on the first feature.
        let set = make_set(
            vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![1.0, 1.0],
            ],
            vec![0, 0, 1, 1],
        );
        let forest = ExtraTreesConfig::new(8)
            .unwrap()
            .with_n_min(1)
            .with_num_attr(NumAttr::Fixed(2))
            .with_seed(42)
            .fit(&set)
            .unwrap();
        for (row, &label) in set.features().iter().zip(set.labels()) {
            assert_eq!(forest.classify(row).unwrap(), label);
        }
    }

    #[test]
    fn singleton_set_always_returns_its_label() {
        let set = make_set(vec![vec![3.14, 2.71]], vec![7]);
        let forest = ExtraTreesConfig::new(4).unwrap().with_seed(1).fit(&set).unwrap();
        assert_eq!(forest.classify(&[0.0, 0.0]).unwrap(), 7);
        assert_eq!(forest.classify(&[100.0, -5.0]).unwrap(), 7);
    }

    #[test]
    fn votes_map_through_original_label_values() {
        // Arbitrary label values survive the dense-index round trip.
        let set = make_set(
            vec![vec![1.0], vec![2.0], vec![10.0], vec![11.0]],
            vec![-2, -2, 1000, 1000],
        );
        let forest = ExtraTreesConfig::new(16)
            .unwrap()
            .with_n_min(1)
            .with_seed(3)
            .fit(&set)
            .unwrap();
        assert_eq!(forest.label_values(), &[-2, 1000]);
        assert_eq!(forest.classify(&[1.5]).unwrap(), -2);
        assert_eq!(forest.classify(&[10.5]).unwrap(), 1000);
    }

    #[test]
    fn deterministic_for_equal_seeds() {
        let set = make_separable();
        let grow = || {
            ExtraTreesConfig::new(10)
                .unwrap()
                .with_seed(99)
                .fit(&set)
                .unwrap()
        };
        assert_eq!(grow(), grow());
    }

    #[test]
    fn accuracy_on_separable_training_set() {
        let set = make_separable();
        let forest = ExtraTreesConfig::new(20)
            .unwrap()
            .with_n_min(1)
            .with_num_attr(NumAttr::Fixed(2))
            .with_seed(42)
            .fit(&set)
            .unwrap();
        let accuracy = forest.accuracy(&set).unwrap();
        assert!(accuracy > 0.95, "accuracy = {accuracy}");
        let tree_accuracy = forest.tree_accuracy(0, &set).unwrap();
        assert!(tree_accuracy > 0.9, "tree accuracy = {tree_accuracy}");
    }

    #[test]
    fn empty_dataset_error() {
        let set = make_set(vec![], vec![]);
        let err = ExtraTreesConfig::new(5).unwrap().fit(&set).unwrap_err();
        assert!(matches!(err, EtError::EmptyDataset));
    }

    #[test]
    fn zero_n_min_error() {
        let set = make_separable();
        let err = ExtraTreesConfig::new(5)
            .unwrap()
            .with_n_min(0)
            .fit(&set)
            .unwrap_err();
        assert!(matches!(err, EtError::InvalidNMin { n_min: 0 }));
    }

    #[test]
    fn classify_feature_mismatch_error() {
        let set = make_separable();
        let forest = ExtraTreesConfig::new(5).unwrap().fit(&set).unwrap();
        let err = forest.classify(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            EtError::ClassifyFeatureMismatch { expected: 2, got: 1 }
        ));
    }

    #[test]
    fn invalid_tree_index_error() {
        let set = make_separable();
        let forest = ExtraTreesConfig::new(5).unwrap().fit(&set).unwrap();
        let err = forest.classify_tree(5, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            EtError::InvalidTreeIndex { tree_index: 5, n_trees: 5 }
        ));
    }
}
