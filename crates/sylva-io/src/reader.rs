//! CSV feature-matrix reader with full input validation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::IoError;

/// A target column as read from the file, before interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetColumn {
    /// Header name of the column.
    pub name: String,
    /// Raw cell values, one per row.
    pub values: Vec<String>,
}

impl TargetColumn {
    /// Parse the values as a continuous target.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::NonNumericTarget`] for the first cell that is not a
    /// finite float.
    pub fn to_continuous(&self) -> Result<Vec<f64>, IoError> {
        self.values
            .iter()
            .enumerate()
            .map(|(row_index, raw)| match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(IoError::NonNumericTarget {
                    row_index,
                    raw: raw.clone(),
                }),
            })
            .collect()
    }

    /// Encode the values as class indices. See [`encode_labels`].
    #[must_use]
    pub fn to_classes(&self) -> (Vec<usize>, Vec<String>) {
        encode_labels(&self.values)
    }
}

/// A validated numeric feature table.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    /// Header names of the feature columns, in file order.
    pub feature_names: Vec<String>,
    /// One row of feature values per data row.
    pub rows: Vec<Vec<f64>>,
    /// The target column, when one was requested.
    pub target: Option<TargetColumn>,
}

impl FeatureTable {
    /// Return the number of data rows.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.rows.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}

/// Map string labels to class indices.
///
/// Classes are the sorted distinct labels; each label is replaced by its
/// position in that list. Returns `(indices, classes)`.
#[must_use]
pub fn encode_labels(labels: &[String]) -> (Vec<usize>, Vec<String>) {
    let classes: Vec<String> = labels
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let indices = labels
        .iter()
        .map(|l| classes.partition_point(|c| c < l))
        .collect();
    (indices, classes)
}

/// Reads a numeric feature matrix from a CSV file.
///
/// Expected CSV format:
/// - Header row required, one name per column
/// - Every column except the optional target column must hold finite floats
/// - All rows must have the same number of columns
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingTargetColumn`] | Requested target column not in header |
/// | [`IoError::NoFeatureColumns`] | Header holds only the target column |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Feature cell is NaN, Inf, or unparseable float |
pub struct FeatureReader {
    path: PathBuf,
    target_column: Option<String>,
}

impl FeatureReader {
    /// Create a new reader for the given CSV file path. All columns are features.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            target_column: None,
        }
    }

    /// Split off the named column as the target.
    #[must_use]
    pub fn with_target_column(mut self, column: Option<String>) -> Self {
        self.target_column = column;
        self
    }

    fn csv_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }

    /// Read and validate the CSV file, returning a [`FeatureTable`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<FeatureTable, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that our own InconsistentRowLength check fires
        // instead of a low-level CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.csv_error(e))?.clone();
        let expected_cols = header.len();

        let target_index = match &self.target_column {
            Some(name) => Some(header.iter().position(|h| h == name).ok_or_else(|| {
                IoError::MissingTargetColumn {
                    path: self.path.clone(),
                    column: name.clone(),
                }
            })?),
            None => None,
        };
        let feature_columns: Vec<usize> =
            (0..expected_cols).filter(|&c| Some(c) != target_index).collect();
        if feature_columns.is_empty() {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }
        debug!(expected_cols, target_index, "read CSV header");

        let mut rows = Vec::new();
        let mut target_values = Vec::new();

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;

            if record.len() != expected_cols {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: expected_cols,
                    got: record.len(),
                });
            }

            let mut values = Vec::with_capacity(feature_columns.len());
            for &col in &feature_columns {
                let raw = record.get(col).unwrap_or("");
                match raw.parse::<f64>() {
                    Ok(v) if v.is_finite() => values.push(v),
                    _ => {
                        return Err(IoError::NonFiniteValue {
                            path: self.path.clone(),
                            row_index,
                            column: header.get(col).unwrap_or("").to_string(),
                            raw: raw.to_string(),
                        });
                    }
                }
            }
            rows.push(values);

            if let Some(t) = target_index {
                target_values.push(record.get(t).unwrap_or("").to_string());
            }
        }

        if rows.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        info!(
            n_samples = rows.len(),
            n_features = feature_columns.len(),
            has_target = target_index.is_some(),
            "feature table loaded"
        );

        Ok(FeatureTable {
            feature_names: feature_columns
                .iter()
                .map(|&c| header.get(c).unwrap_or("").to_string())
                .collect(),
            rows,
            target: target_index.map(|t| TargetColumn {
                name: header.get(t).unwrap_or("").to_string(),
                values: target_values,
            }),
        })
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

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    // --- Reading ---

    #[test]
    fn read_features_only() {
        let f = write_csv("a,b,c\n1.0,2.0,3.0\n4.0,5.0,6.0\n");
        let table = FeatureReader::new(f.path()).read().unwrap();
        assert_eq!(table.feature_names, strings(&["a", "b", "c"]));
        assert_eq!(table.rows, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert!(table.target.is_none());
        assert_eq!((table.n_samples(), table.n_features()), (2, 3));
    }

    #[test]
    fn read_with_target_in_middle() {
        let f = write_csv("x0,label,x1\n0.5,cat,1.5\n2.5,dog,3.5\n");
        let table = FeatureReader::new(f.path())
            .with_target_column(Some("label".into()))
            .read()
            .unwrap();
        assert_eq!(table.feature_names, strings(&["x0", "x1"]));
        assert_eq!(table.rows[1], vec![2.5, 3.5]);
        let target = table.target.unwrap();
        assert_eq!(target.name, "label");
        assert_eq!(target.values, strings(&["cat", "dog"]));
    }

    #[test]
    fn whitespace_is_trimmed() {
        let f = write_csv("a , b\n 1.0 , 2.0 \n");
        let table = FeatureReader::new(f.path()).read().unwrap();
        assert_eq!(table.feature_names, strings(&["a", "b"]));
        assert_eq!(table.rows, vec![vec![1.0, 2.0]]);
    }

    // --- Errors ---

    #[test]
    fn error_file_not_found() {
        let result = FeatureReader::new(Path::new("/nonexistent/file.csv")).read();
        assert!(matches!(result, Err(IoError::FileNotFound { .. })));
    }

    #[test]
    fn error_empty_dataset() {
        let f = write_csv("a,b\n");
        let result = FeatureReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::EmptyDataset { .. })));
    }

    #[test]
    fn error_missing_target_column() {
        let f = write_csv("a,b\n1,2\n");
        let result = FeatureReader::new(f.path())
            .with_target_column(Some("y".into()))
            .read();
        assert!(matches!(result, Err(IoError::MissingTargetColumn { column, .. }) if column == "y"));
    }

    #[test]
    fn error_target_is_only_column() {
        let f = write_csv("y\n1\n");
        let result = FeatureReader::new(f.path())
            .with_target_column(Some("y".into()))
            .read();
        assert!(matches!(result, Err(IoError::NoFeatureColumns { .. })));
    }

    #[test]
    fn error_inconsistent_row_length() {
        let f = write_csv("a,b,c\n1,2,3\n1,2\n");
        let result = FeatureReader::new(f.path()).read();
        assert!(matches!(
            result,
            Err(IoError::InconsistentRowLength { row_index: 1, expected: 3, got: 2, .. })
        ));
    }

    #[test]
    fn error_non_finite_names_column() {
        let f = write_csv("a,b\n1.0,NaN\n");
        let result = FeatureReader::new(f.path()).read();
        assert!(matches!(
            result,
            Err(IoError::NonFiniteValue { row_index: 0, column, .. }) if column == "b"
        ));
    }

    #[test]
    fn error_unparseable_value() {
        let f = write_csv("a,b\n1.0,abc\n");
        let result = FeatureReader::new(f.path()).read();
        assert!(matches!(result, Err(IoError::NonFiniteValue { .. })));
    }

    // --- Targets ---

    #[test]
    fn encode_labels_sorted_classes() {
        let (indices, classes) = encode_labels(&strings(&["b", "a", "c", "a"]));
        assert_eq!(classes, strings(&["a", "b", "c"]));
        assert_eq!(indices, vec![1, 0, 2, 0]);
    }

    #[test]
    fn continuous_target_parses() {
        let column = TargetColumn {
            name: "y".into(),
            values: strings(&["1.5", "-2"]),
        };
        assert_eq!(column.to_continuous().unwrap(), vec![1.5, -2.0]);
    }

    #[test]
    fn continuous_target_rejects_text() {
        let column = TargetColumn {
            name: "y".into(),
            values: strings(&["1.5", "x", "inf"]),
        };
        let err = column.to_continuous().unwrap_err();
        assert!(matches!(err, IoError::NonNumericTarget { row_index: 1, .. }));
    }
}
