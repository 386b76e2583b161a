use std::path::PathBuf;

/// Errors from Extra-Trees training, classification, and persistence.
#[derive(Debug, thiserror::Error)]
pub enum EtError {
    /// Returned when numtrees is zero.
    #[error("numtrees must be at least 1, got {num_trees}")]
    InvalidTreeCount {
        /// The invalid numtrees value provided.
        num_trees: usize,
    },

    /// Returned when nmin is zero.
    #[error("nmin must be at least 1, got {n_min}")]
    InvalidNMin {
        /// The invalid nmin value provided.
        n_min: usize,
    },

    /// Returned when numattr resolves to zero.
    #[error("numattr must be at least 1, got {num_attr}")]
    InvalidNumAttr {
        /// The invalid numattr value provided.
        num_attr: usize,
    },

    /// Returned when the optimizer is asked for zero layers.
    #[error("optimization layers must be at least 1, got {layers}")]
    InvalidLayerCount {
        /// The invalid layer count provided.
        layers: usize,
    },

    /// Returned when the example set has zero examples.
    #[error("example set has zero examples")]
    EmptyDataset,

    /// Returned when the example set has zero feature columns.
    #[error("example set has zero feature columns")]
    ZeroFeatures,

    /// Returned when an example row has a different number of features than expected.
    #[error("example {example_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the row.
        got: usize,
        /// The zero-based index of the offending example.
        example_index: usize,
    },

    /// Returned when the label vector and the feature rows disagree in length.
    #[error("example set has {n_examples} feature rows but {n_labels} labels")]
    LabelCountMismatch {
        /// The number of feature rows.
        n_examples: usize,
        /// The number of labels.
        n_labels: usize,
    },

    /// Returned when a feature vector has the wrong length at classification time.
    #[error("classification input has {got} features, expected {expected}")]
    ClassifyFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the input.
        got: usize,
    },

    /// Returned when a per-tree operation names a tree the forest does not have.
    #[error("tree index {tree_index} out of range for a forest of {n_trees} trees")]
    InvalidTreeIndex {
        /// The requested tree index.
        tree_index: usize,
        /// The number of trees in the forest.
        n_trees: usize,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the model file is truncated or malformed.
    #[error("malformed model file {path}, line {line}: {reason}")]
    ModelParse {
        /// Path to the model file.
        path: PathBuf,
        /// One-based line number where parsing failed.
        line: usize,
        /// Human-readable description of what was wrong.
        reason: String,
    },
}
