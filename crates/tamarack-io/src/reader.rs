//! Training CSV reader with full input validation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use tamarack_trees::ExampleSet;

use crate::IoError;

/// Role of one file column after header mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRole {
    Feature,
    Label,
    Excluded,
}

/// Reads a labeled training set from a CSV file.
///
/// Expected format: a header row naming every column, then one record per
/// example with exactly as many comma-separated fields as the header.
/// Feature cells must parse as finite floats, the label cell as an integer.
/// The label column is chosen by name, or defaults to the last column of
/// the file; excluded columns are dropped from the features but their names
/// are retained in file order.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::LabelColumnExcluded`] | Label column also listed in the exclusions |
/// | [`IoError::LabelColumnNotFound`] | Named label column absent from the header |
/// | [`IoError::ExcludedColumnsMissing`] | An excluded name absent from the header |
/// | [`IoError::NoFeatureColumns`] | No feature columns remain |
/// | [`IoError::InconsistentRowLength`] | Row column count differs from the header |
/// | [`IoError::FeatureParse`] / [`IoError::NonFiniteValue`] | Bad feature cell |
/// | [`IoError::LabelParse`] | Bad label cell |
/// | [`IoError::EmptyDataset`] | Zero data rows after the header |
pub struct TrainingReader {
    path: PathBuf,
    label_column: Option<String>,
    excluded: BTreeSet<String>,
}

impl TrainingReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            label_column: None,
            excluded: BTreeSet::new(),
        }
    }

    /// Name the label column instead of defaulting to the last column.
    #[must_use]
    pub fn with_label_column(mut self, name: impl Into<String>) -> Self {
        self.label_column = Some(name.into());
        self
    }

    /// Exclude the named columns from the features.
    #[must_use]
    pub fn with_excluded(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.excluded.extend(names);
        self
    }

    /// Read and validate the CSV file, returning an [`ExampleSet`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<ExampleSet, IoError> {
        if let Some(name) = &self.label_column
            && self.excluded.contains(name)
        {
            return Err(IoError::LabelColumnExcluded { name: name.clone() });
        }

        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) allows rows with varying column counts so that our
        // own InconsistentRowLength check fires instead of a low-level
        // CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        })?;
        let expected_cols = header.len();
        debug!(expected_cols, "read CSV header");

        // Map every file column to a role.
        let mut roles = Vec::with_capacity(expected_cols);
        let mut names: Vec<String> = Vec::with_capacity(expected_cols);
        for token in header.iter() {
            let role = if self.label_column.as_deref() == Some(token) {
                ColumnRole::Label
            } else if self.excluded.contains(token) {
                ColumnRole::Excluded
            } else {
                ColumnRole::Feature
            };
            roles.push(role);
            names.push(token.to_string());
        }

        let label_name = match &self.label_column {
            Some(name) => {
                if !roles.contains(&ColumnRole::Label) {
                    return Err(IoError::LabelColumnNotFound {
                        path: self.path.clone(),
                        name: name.clone(),
                    });
                }
                name.clone()
            }
            None => {
                // Default: the last column of the file is the label.
                let Some(last_role) = roles.last_mut() else {
                    return Err(IoError::NoFeatureColumns {
                        path: self.path.clone(),
                    });
                };
                let name = names.last().cloned().unwrap_or_default();
                match last_role {
                    ColumnRole::Feature => *last_role = ColumnRole::Label,
                    _ => return Err(IoError::LabelColumnExcluded { name }),
                }
                name
            }
        };

        let feature_names: Vec<String> = roles
            .iter()
            .zip(&names)
            .filter(|(role, _)| **role == ColumnRole::Feature)
            .map(|(_, name)| name.clone())
            .collect();
        let excluded_names: Vec<String> = roles
            .iter()
            .zip(&names)
            .filter(|(role, _)| **role == ColumnRole::Excluded)
            .map(|(_, name)| name.clone())
            .collect();

        if excluded_names.len() != self.excluded.len() {
            let found: BTreeSet<&String> = excluded_names.iter().collect();
            let missing: Vec<String> = self
                .excluded
                .iter()
                .filter(|name| !found.contains(name))
                .cloned()
                .collect();
            return Err(IoError::ExcludedColumnsMissing {
                path: self.path.clone(),
                missing,
            });
        }

        if feature_names.is_empty() {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }

        // Parse the records under the column-role map.
        let mut features: Vec<Vec<f32>> = Vec::new();
        let mut labels: Vec<i32> = Vec::new();

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| IoError::CsvParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?;

            if record.len() != expected_cols {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: expected_cols,
                    got: record.len(),
                });
            }

            let mut row = Vec::with_capacity(feature_names.len());
            for (col_index, (cell, role)) in record.iter().zip(&roles).enumerate() {
                match role {
                    ColumnRole::Feature => {
                        let value: f32 = cell.parse().map_err(|_| IoError::FeatureParse {
                            path: self.path.clone(),
                            row_index,
                            col_index,
                            raw: cell.to_string(),
                        })?;
                        if !value.is_finite() {
                            return Err(IoError::NonFiniteValue {
                                path: self.path.clone(),
                                row_index,
                                col_index,
                                raw: cell.to_string(),
                            });
                        }
                        row.push(value);
                    }
                    ColumnRole::Label => {
                        let label: i32 = cell.parse().map_err(|_| IoError::LabelParse {
                            path: self.path.clone(),
                            row_index,
                            col_index,
                            raw: cell.to_string(),
                        })?;
                        labels.push(label);
                    }
                    ColumnRole::Excluded => {}
                }
            }
            features.push(row);
        }

        if labels.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        let examples = ExampleSet::new(label_name, feature_names, excluded_names, features, labels)
            .map_err(|source| IoError::InvalidExamples {
                path: self.path.clone(),
                source,
            })?;

        info!(
            n_examples = examples.n_examples(),
            n_features = examples.n_features(),
            n_classes = examples.n_classes(),
            label = examples.label_name(),
            "training data loaded"
        );

        Ok(examples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn read_with_default_last_column_label() {
        let csv = "x1,x2,y\n0.5,1.0,0\n1.5,2.0,1\n2.5,3.0,0\n";
        let f = write_csv(csv);
        let set = TrainingReader::new(f.path()).read().unwrap();
        assert_eq!(set.label_name(), "y");
        assert_eq!(set.feature_names(), &["x1", "x2"]);
        assert_eq!(set.n_examples(), 3);
        assert_eq!(set.labels(), &[0, 1, 0]);
        assert!((set.features()[1][0] - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn read_with_named_label_column() {
        let csv = "x1,y,x2\n0.5,0,1.0\n1.5,1,2.0\n";
        let f = write_csv(csv);
        let set = TrainingReader::new(f.path())
            .with_label_column("y")
            .read()
            .unwrap();
        assert_eq!(set.label_name(), "y");
        assert_eq!(set.feature_names(), &["x1", "x2"]);
        assert_eq!(set.labels(), &[0, 1]);
        assert_eq!(set.features()[0], vec![0.5, 1.0]);
    }

    #[test]
    fn excluded_columns_are_dropped_but_remembered() {
        let csv = "id,x1,x2,y\nA,0.5,1.0,0\nB,1.5,2.0,1\n";
        let f = write_csv(csv);
        let set = TrainingReader::new(f.path())
            .with_excluded(["id".to_string()])
            .read()
            .unwrap();
        assert_eq!(set.excluded_names(), &["id"]);
        assert_eq!(set.feature_names(), &["x1", "x2"]);
        assert_eq!(set.features()[0], vec![0.5, 1.0]);
    }

    #[test]
    fn label_column_not_found_error() {
        let csv = "x1,y\n0.5,0\n";
        let f = write_csv(csv);
        let err = TrainingReader::new(f.path())
            .with_label_column("target")
            .read()
            .unwrap_err();
        assert!(matches!(err, IoError::LabelColumnNotFound { .. }));
    }

    #[test]
    fn excluded_label_column_error() {
        let csv = "x1,y\n0.5,0\n";
        let f = write_csv(csv);
        let err = TrainingReader::new(f.path())
            .with_label_column("y")
            .with_excluded(["y".to_string()])
            .read()
            .unwrap_err();
        assert!(matches!(err, IoError::LabelColumnExcluded { .. }));
    }

    #[test]
    fn excluding_default_label_column_error() {
        // No -y given, so the last column is the label; excluding it is fatal.
        let csv = "x1,y\n0.5,0\n";
        let f = write_csv(csv);
        let err = TrainingReader::new(f.path())
            .with_excluded(["y".to_string()])
            .read()
            .unwrap_err();
        assert!(matches!(err, IoError::LabelColumnExcluded { .. }));
    }

    #[test]
    fn missing_excluded_columns_error() {
        let csv = "x1,y\n0.5,0\n";
        let f = write_csv(csv);
        let err = TrainingReader::new(f.path())
            .with_excluded(["nope".to_string()])
            .read()
            .unwrap_err();
        match err {
            IoError::ExcludedColumnsMissing { missing, .. } => {
                assert_eq!(missing, vec!["nope".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn no_feature_columns_error() {
        let csv = "y\n0\n1\n";
        let f = write_csv(csv);
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::NoFeatureColumns { .. }));
    }

    #[test]
    fn inconsistent_row_length_error() {
        let csv = "x1,x2,y\n0.5,1.0,0\n1.5,1\n";
        let f = write_csv(csv);
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            IoError::InconsistentRowLength {
                row_index: 1,
                expected: 3,
                got: 2,
                ..
            }
        ));
    }

    #[test]
    fn unparseable_feature_error() {
        let csv = "x1,y\nabc,0\n";
        let f = write_csv(csv);
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            IoError::FeatureParse {
                row_index: 0,
                col_index: 0,
                ..
            }
        ));
    }

    #[test]
    fn non_finite_feature_error() {
        let csv = "x1,y\nNaN,0\n";
        let f = write_csv(csv);
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::NonFiniteValue { .. }));
    }

    #[test]
    fn unparseable_label_error() {
        let csv = "x1,y\n0.5,zero\n";
        let f = write_csv(csv);
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(
            err,
            IoError::LabelParse {
                row_index: 0,
                col_index: 1,
                ..
            }
        ));
    }

    #[test]
    fn float_label_is_rejected() {
        let csv = "x1,y\n0.5,1.5\n";
        let f = write_csv(csv);
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::LabelParse { .. }));
    }

    #[test]
    fn empty_dataset_error() {
        let csv = "x1,y\n";
        let f = write_csv(csv);
        let err = TrainingReader::new(f.path()).read().unwrap_err();
        assert!(matches!(err, IoError::EmptyDataset { .. }));
    }

    #[test]
    fn crlf_line_endings_are_handled() {
        let csv = "x1,y\r\n0.5,0\r\n1.5,1\r\n";
        let f = write_csv(csv);
        let set = TrainingReader::new(f.path()).read().unwrap();
        assert_eq!(set.n_examples(), 2);
        assert_eq!(set.labels(), &[0, 1]);
    }
}
