//! Example-set storage: row form for loading and splitting, column form for
//! tree growth.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::EtError;

/// A labeled example set in row-major form.
///
/// Produced by the CSV loader and consumed read-only by training. Feature
/// rows and labels are parallel vectors — `features[i]` corresponds to
/// `labels[i]`. The label set is the canonical index-to-label order: dense
/// label indices are assigned by ascending label value.
#[derive(Debug, Clone)]
pub struct ExampleSet {
    /// Name of the label column.
    label_name: String,
    /// Feature column names, in attribute-index order.
    feature_names: Vec<String>,
    /// Names of columns excluded from the features, in file order.
    excluded_names: Vec<String>,
    /// Feature values: `features[example_index][feature_index]`.
    features: Vec<Vec<f32>>,
    /// Raw label values, parallel to `features`.
    labels: Vec<i32>,
    /// All distinct label values; iteration order defines the dense indices.
    label_set: BTreeSet<i32>,
}

impl ExampleSet {
    /// Create a new example set, deriving the label set from the labels.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`EtError::LabelCountMismatch`] | `features` and `labels` differ in length |
    /// | [`EtError::FeatureCountMismatch`] | a row's length differs from `feature_names` |
    pub fn new(
        label_name: String,
        feature_names: Vec<String>,
        excluded_names: Vec<String>,
        features: Vec<Vec<f32>>,
        labels: Vec<i32>,
    ) -> Result<Self, EtError> {
        if features.len() != labels.len() {
            return Err(EtError::LabelCountMismatch {
                n_examples: features.len(),
                n_labels: labels.len(),
            });
        }
        for (example_index, row) in features.iter().enumerate() {
            if row.len() != feature_names.len() {
                return Err(EtError::FeatureCountMismatch {
                    expected: feature_names.len(),
                    got: row.len(),
                    example_index,
                });
            }
        }
        let label_set: BTreeSet<i32> = labels.iter().copied().collect();
        Ok(Self {
            label_name,
            feature_names,
            excluded_names,
            features,
            labels,
            label_set,
        })
    }

    /// Return the label column name.
    #[must_use]
    pub fn label_name(&self) -> &str {
        &self.label_name
    }

    /// Return the feature column names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the excluded column names.
    #[must_use]
    pub fn excluded_names(&self) -> &[String] {
        &self.excluded_names
    }

    /// Return the feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f32>] {
        &self.features
    }

    /// Return the raw label values.
    #[must_use]
    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    /// Return the set of distinct label values in canonical order.
    #[must_use]
    pub fn label_set(&self) -> &BTreeSet<i32> {
        &self.label_set
    }

    /// Return the number of examples.
    #[must_use]
    pub fn n_examples(&self) -> usize {
        self.labels.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Return the number of distinct classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.label_set.len()
    }

    /// Randomly partition the examples into two disjoint subsets.
    ///
    /// `train_fraction` is clamped to `[0, 1]`. The first subset receives
    /// `floor(train_fraction · N)` examples, the second the remainder. Both
    /// subsets inherit the column names and the full label set of the parent
    /// so dense label indices stay aligned across subsets even when one of
    /// them misses a class entirely.
    #[must_use]
    pub fn split(&self, train_fraction: f64, rng: &mut impl Rng) -> (ExampleSet, ExampleSet) {
        let train_fraction = train_fraction.clamp(0.0, 1.0);
        let n = self.n_examples();

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);

        let divider = (train_fraction * n as f64) as usize;
        debug!(n, divider, "splitting example set");

        let subset = |picked: &[usize]| ExampleSet {
            label_name: self.label_name.clone(),
            feature_names: self.feature_names.clone(),
            excluded_names: self.excluded_names.clone(),
            features: picked.iter().map(|&i| self.features[i].clone()).collect(),
            labels: picked.iter().map(|&i| self.labels[i]).collect(),
            label_set: self.label_set.clone(),
        };

        (subset(&indices[..divider]), subset(&indices[divider..]))
    }
}

/// The attribute-major example layout consumed by the tree builder.
///
/// `columns[j][i]` is example `i`'s value for feature `j`; `labels[i]` is
/// the dense label index of example `i` in `[0, n_classes)`.
#[derive(Debug)]
pub(crate) struct ColumnSet {
    /// One column per feature, each of length `n_examples`.
    pub(crate) columns: Vec<Vec<f32>>,
    /// Canonical index-to-label map.
    pub(crate) label_values: Vec<i32>,
    /// Dense label index of every example.
    pub(crate) labels: Vec<usize>,
    /// Number of distinct classes.
    pub(crate) n_classes: usize,
}

impl ColumnSet {
    /// Pivot a row-major example set to attribute-major form and assign
    /// dense label indices by iterating the label set in canonical order.
    pub(crate) fn from_examples(examples: &ExampleSet) -> Self {
        let n_features = examples.n_features();

        let mut columns: Vec<Vec<f32>> = (0..n_features)
            .map(|_| Vec::with_capacity(examples.n_examples()))
            .collect();
        for row in examples.features() {
            for (column, &value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
        }

        let mut label_values = Vec::with_capacity(examples.n_classes());
        let mut label_to_index = BTreeMap::new();
        for &label in examples.label_set() {
            label_to_index.insert(label, label_values.len());
            label_values.push(label);
        }

        let labels: Vec<usize> = examples
            .labels()
            .iter()
            .map(|l| label_to_index[l])
            .collect();

        let n_classes = label_values.len();
        Self {
            columns,
            label_values,
            labels,
            n_classes,
        }
    }
}
