//! Line-oriented textual persistence of a trained model.
//!
//! The format, in order: the label line (`<labelname> <label_0> …`), the
//! excluded column names, the feature names, the four-integer parameter
//! line (`numtrees nmin numattr optimizationlayers`), then `numtrees` tree
//! blobs serialized pre-order, one node per line — `\ <freq_0> …` for a
//! leaf, `+ <attrindex> <splitvalue>` for a branch followed by the left
//! subtree then the right subtree.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::EtError;
use crate::forest::Forest;
use crate::node::{FeatureIndex, Node, NodeIndex};
use crate::tree::DecisionTree;

const LEAF_MARKER: &str = "\\";
const BRANCH_MARKER: &str = "+";

/// A trained model together with the metadata the file format records.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Name of the label column.
    pub label_name: String,
    /// Names of the columns excluded from the features, in file order.
    pub excluded_names: Vec<String>,
    /// Feature column names, in attribute-index order.
    pub feature_names: Vec<String>,
    /// The nmin the forest was grown with.
    pub n_min: usize,
    /// The resolved numattr the forest was grown with.
    pub num_attr: usize,
    /// Fold count of the hyperparameter sweep; 1 when optimization was off.
    pub optimization_layers: usize,
    /// The grown ensemble.
    pub forest: Forest,
}

impl Model {
    /// Write the model to `path`, overwriting any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`EtError::WriteModel`] when the file cannot be created or
    /// written.
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), EtError> {
        let path = path.as_ref();
        let write_err = |source| EtError::WriteModel {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(write_err)?;
        let mut out = BufWriter::new(file);
        self.write_to(&mut out).map_err(write_err)?;
        out.flush().map_err(write_err)?;

        info!(
            n_trees = self.forest.n_trees(),
            n_classes = self.forest.n_classes(),
            "model saved"
        );
        Ok(())
    }

    fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        write!(out, "{}", self.label_name)?;
        for label in self.forest.label_values() {
            write!(out, " {label}")?;
        }
        writeln!(out)?;

        writeln!(out, "{}", self.excluded_names.join(" "))?;
        writeln!(out, "{}", self.feature_names.join(" "))?;

        writeln!(
            out,
            "{} {} {} {}",
            self.forest.n_trees(),
            self.n_min,
            self.num_attr,
            self.optimization_layers
        )?;

        for tree in self.forest.trees() {
            write_node(tree, NodeIndex::new(0), out)?;
        }
        Ok(())
    }

    /// Read a model back from `path`.
    ///
    /// The class count is taken from the label line; each tree is rebuilt by
    /// consuming one marker-dispatched node line at a time.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`EtError::ReadModel`] | the file cannot be opened or read |
    /// | [`EtError::ModelParse`] | the file is truncated or malformed |
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EtError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| EtError::ReadModel {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = ModelReader::new(path, BufReader::new(file));

        // Label line: column name, then the canonical label values.
        let label_line = reader.next_line()?;
        let mut tokens = label_line.split_whitespace();
        let label_name = tokens
            .next()
            .ok_or_else(|| reader.parse_error("missing label line"))?
            .to_string();
        let mut label_values = Vec::new();
        for token in tokens {
            let label: i32 = token
                .parse()
                .map_err(|_| reader.parse_error(format!("invalid label value `{token}`")))?;
            label_values.push(label);
        }
        let n_classes = label_values.len();

        let excluded_names = split_names(&reader.next_line()?);
        let feature_names = split_names(&reader.next_line()?);

        // Parameter line: numtrees nmin numattr optimizationlayers.
        let param_line = reader.next_line()?;
        let params: Vec<usize> = param_line
            .split_whitespace()
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|_| reader.parse_error("invalid parameter line"))?;
        let &[num_trees, n_min, num_attr, optimization_layers] = params.as_slice() else {
            return Err(reader.parse_error(format!(
                "expected four integers on the parameter line, got {}",
                params.len()
            )));
        };

        let mut trees = Vec::with_capacity(num_trees);
        for _ in 0..num_trees {
            let mut arena = Vec::new();
            read_node(&mut reader, n_classes, &mut arena)?;
            trees.push(DecisionTree::from_nodes(arena));
        }

        debug!(num_trees, n_classes, "model loaded");

        Ok(Model {
            label_name,
            excluded_names,
            feature_names: feature_names.clone(),
            n_min,
            num_attr,
            optimization_layers,
            forest: Forest::from_parts(trees, label_values, feature_names.len()),
        })
    }
}

/// Serialize the subtree rooted at `index` pre-order, one node per line.
fn write_node(tree: &DecisionTree, index: NodeIndex, out: &mut impl Write) -> io::Result<()> {
    match &tree.nodes()[index.index()] {
        Node::Leaf { class_freqs } => {
            write!(out, "{LEAF_MARKER}")?;
            for freq in class_freqs {
                write!(out, " {freq}")?;
            }
            writeln!(out)
        }
        Node::Branch {
            feature,
            split,
            left,
            right,
        } => {
            writeln!(out, "{BRANCH_MARKER} {feature} {split}")?;
            write_node(tree, *left, out)?;
            write_node(tree, *right, out)
        }
    }
}

/// Rebuild one pre-order subtree from the reader into `arena`.
fn read_node(
    reader: &mut ModelReader<'_>,
    n_classes: usize,
    arena: &mut Vec<Node>,
) -> Result<NodeIndex, EtError> {
    let line = reader.next_line()?;
    let mut tokens = line.split_whitespace();

    match tokens.next() {
        Some(LEAF_MARKER) => {
            let mut class_freqs = Vec::with_capacity(n_classes);
            for token in tokens {
                let freq: usize = token.parse().map_err(|_| {
                    reader.parse_error(format!("invalid class frequency `{token}`"))
                })?;
                class_freqs.push(freq);
            }
            if class_freqs.len() != n_classes {
                return Err(reader.parse_error(format!(
                    "leaf has {} class frequencies, expected {n_classes}",
                    class_freqs.len()
                )));
            }
            let index = arena.len();
            arena.push(Node::Leaf { class_freqs });
            Ok(NodeIndex::new(index))
        }
        Some(BRANCH_MARKER) => {
            let attr_index: usize = tokens
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| reader.parse_error("branch is missing its attribute index"))?;
            let split: f32 = tokens
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| reader.parse_error("branch is missing its split value"))?;

            // Reserve the parent slot so children land after it, keeping the
            // pre-order arena layout of the builder.
            let index = arena.len();
            arena.push(Node::Leaf {
                class_freqs: vec![0; n_classes],
            });
            let left = read_node(reader, n_classes, arena)?;
            let right = read_node(reader, n_classes, arena)?;
            arena[index] = Node::Branch {
                feature: FeatureIndex::new(attr_index),
                split,
                left,
                right,
            };
            Ok(NodeIndex::new(index))
        }
        Some(other) => Err(reader.parse_error(format!("unknown node marker `{other}`"))),
        None => Err(reader.parse_error("blank line inside a tree block")),
    }
}

fn split_names(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}

/// Line-counting reader so parse errors can name the offending line.
struct ModelReader<'a> {
    path: &'a Path,
    lines: Lines<BufReader<File>>,
    line: usize,
}

impl<'a> ModelReader<'a> {
    fn new(path: &'a Path, reader: BufReader<File>) -> Self {
        Self {
            path,
            lines: reader.lines(),
            line: 0,
        }
    }

    fn next_line(&mut self) -> Result<String, EtError> {
        self.line += 1;
        match self.lines.next() {
            Some(Ok(line)) => Ok(line),
            Some(Err(source)) => Err(EtError::ReadModel {
                path: self.path.to_path_buf(),
                source,
            }),
            None => Err(self.parse_error("unexpected end of file")),
        }
    }

    fn parse_error(&self, reason: impl Into<String>) -> EtError {
        EtError::ModelParse {
            path: self.path.to_path_buf(),
            line: self.line,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::Model;
    use crate::config::{ExtraTreesConfig, NumAttr};
    use crate::dataset::ExampleSet;
    use crate::error::EtError;

    fn make_set() -> ExampleSet {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..15 {
            features.push(vec![i as f32 * 0.3, (i % 5) as f32]);
            labels.push(if i < 8 { -3 } else { 12 });
        }
        ExampleSet::new(
            "outcome".to_string(),
            vec!["x1".to_string(), "x2".to_string()],
            vec!["id".to_string()],
            features,
            labels,
        )
        .unwrap()
    }

    fn train_model(set: &ExampleSet) -> Model {
        let forest = ExtraTreesConfig::new(5)
            .unwrap()
            .with_n_min(2)
            .with_num_attr(NumAttr::Fixed(1))
            .with_seed(42)
            .fit(set)
            .unwrap();
        Model {
            label_name: set.label_name().to_string(),
            excluded_names: set.excluded_names().to_vec(),
            feature_names: set.feature_names().to_vec(),
            n_min: 2,
            num_attr: 1,
            optimization_layers: 1,
            forest,
        }
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let first_path = dir.path().join("model.txt");
        let second_path = dir.path().join("model2.txt");

        let model = train_model(&make_set());
        model.save(&first_path).unwrap();

        let reloaded = Model::load(&first_path).unwrap();
        reloaded.save(&second_path).unwrap();

        let first = std::fs::read(&first_path).unwrap();
        let second = std::fs::read(&second_path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn reloaded_model_classifies_identically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.txt");

        let set = make_set();
        let model = train_model(&set);
        model.save(&path).unwrap();
        let reloaded = Model::load(&path).unwrap();

        assert_eq!(reloaded, model);
        for row in set.features() {
            assert_eq!(
                reloaded.forest.classify(row).unwrap(),
                model.forest.classify(row).unwrap()
            );
        }
    }

    #[test]
    fn header_records_names_and_parameters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.txt");

        let model = train_model(&make_set());
        model.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("outcome -3 12"));
        assert_eq!(lines.next(), Some("id"));
        assert_eq!(lines.next(), Some("x1 x2"));
        assert_eq!(lines.next(), Some("5 2 1 1"));
    }

    #[test]
    fn load_nonexistent_file_error() {
        let err = Model::load("/tmp/nonexistent_model_f61a.txt").unwrap_err();
        assert!(matches!(err, EtError::ReadModel { .. }));
    }

    #[test]
    fn truncated_model_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.txt");

        let model = train_model(&make_set());
        model.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let cut: String = text.lines().take(6).collect::<Vec<_>>().join("\n");
        std::fs::write(&path, cut).unwrap();

        let err = Model::load(&path).unwrap_err();
        assert!(matches!(err, EtError::ModelParse { .. }));
    }

    #[test]
    fn unknown_marker_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.txt");
        std::fs::write(&path, "y 0 1\n\nx1\n1 2 1 1\n? 0 0.5\n").unwrap();

        let err = Model::load(&path).unwrap_err();
        match err {
            EtError::ModelParse { line, reason, .. } => {
                assert_eq!(line, 5);
                assert!(reason.contains("unknown node marker"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_parameter_line_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.txt");
        std::fs::write(&path, "y 0 1\n\nx1\n1 2\n").unwrap();

        let err = Model::load(&path).unwrap_err();
        match err {
            EtError::ModelParse { line, reason, .. } => {
                assert_eq!(line, 4);
                assert!(reason.contains("four integers"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn leaf_frequency_count_checked_against_label_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.txt");
        // Three labels, but the leaf carries only two buckets.
        std::fs::write(&path, "y 0 1 2\n\nx1\n1 2 1 1\n\\ 3 4\n").unwrap();

        let err = Model::load(&path).unwrap_err();
        match err {
            EtError::ModelParse { reason, .. } => {
                assert!(reason.contains("expected 3"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
