// src/matrix.rs

use crate::error::{AnalysisError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Selects which aggregate a standardization divides by.
///
/// `Rows` computes the aggregate (sum, max, mean...) over each row and
/// applies it to that row's cells; `Columns` does the same per column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Margin {
    Rows,
    Columns,
}

impl Margin {
    /// Axis to iterate over so that each item is one row (or one column).
    pub(crate) fn iter_axis(self) -> Axis {
        match self {
            Margin::Rows => Axis(0),
            Margin::Columns => Axis(1),
        }
    }
}

impl fmt::Display for Margin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Margin::Rows => write!(f, "row"),
            Margin::Columns => write!(f, "column"),
        }
    }
}

/// A numeric table with named sample units (rows) and variables (columns).
///
/// Missing cells are stored as `NaN`. No operation in this crate produces a
/// `NaN` other than by carrying an input's missing cell through unchanged,
/// so `NaN` and "missing" are the same thing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LabeledMatrix {
    row_labels: Vec<String>,
    col_labels: Vec<String>,
    values: Array2<f64>,
}

impl LabeledMatrix {
    /// Builds a matrix after checking that labels match the shape and are unique per axis.
    pub fn new(row_labels: Vec<String>, col_labels: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if row_labels.len() != values.nrows() {
            return Err(AnalysisError::DimensionMismatch {
                context: "row labels vs matrix rows",
                expected: values.nrows(),
                found: row_labels.len(),
            });
        }
        if col_labels.len() != values.ncols() {
            return Err(AnalysisError::DimensionMismatch {
                context: "column labels vs matrix columns",
                expected: values.ncols(),
                found: col_labels.len(),
            });
        }
        check_unique(&row_labels)?;
        check_unique(&col_labels)?;
        Ok(Self { row_labels, col_labels, values })
    }

    /// Builds a matrix with generated labels `S1..Sn` and `V1..Vp`.
    pub fn from_array(values: Array2<f64>) -> Self {
        let row_labels = (0..values.nrows()).map(generated_row_label).collect();
        let col_labels = (0..values.ncols()).map(generated_col_label).collect();
        Self { row_labels, col_labels, values }
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    pub fn col_labels(&self) -> &[String] {
        &self.col_labels
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.col_labels
            .iter()
            .position(|label| label == name)
            .ok_or_else(|| AnalysisError::UnknownColumn(name.to_string()))
    }

    /// A view of one column by name.
    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let j = self.column_index(name)?;
        Ok(self.values.column(j))
    }

    /// Keeps only the named columns, in the order given.
    pub fn select_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|name| self.column_index(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.select_column_indices(&indices)
    }

    /// Keeps only the columns at `indices`, in the order given.
    pub(crate) fn select_column_indices(&self, indices: &[usize]) -> Result<Self> {
        let col_labels: Vec<String> = indices.iter().map(|&j| self.col_labels[j].clone()).collect();
        check_unique(&col_labels)?;
        let values = if indices.is_empty() {
            Array2::zeros((self.nrows(), 0))
        } else {
            self.values.select(Axis(1), indices)
        };
        Ok(Self {
            row_labels: self.row_labels.clone(),
            col_labels,
            values,
        })
    }

    pub fn is_missing(&self, row: usize, col: usize) -> bool {
        self.values[[row, col]].is_nan()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|v| v.is_nan())
    }

    /// Fails with `MissingValue` naming the first missing cell in row-major order.
    pub fn ensure_complete(&self) -> Result<()> {
        match self.values.indexed_iter().find(|(_, v)| v.is_nan()) {
            Some(((i, j), _)) => Err(AnalysisError::MissingValue {
                row: self.row_labels[i].clone(),
                column: self.col_labels[j].clone(),
            }),
            None => Ok(()),
        }
    }

    /// Fails on the first non-finite cell in row-major order: `MissingValue`
    /// for a missing cell, `Domain` for an infinity.
    pub fn ensure_finite(&self, operation: &'static str) -> Result<()> {
        check_finite(
            &self.values,
            operation,
            |i| self.row_labels[i].clone(),
            |j| self.col_labels[j].clone(),
        )
    }

    /// Same labels, new values. Callers guarantee the shape is unchanged.
    pub(crate) fn with_values(&self, values: Array2<f64>) -> Self {
        debug_assert_eq!(values.dim(), self.values.dim());
        Self {
            row_labels: self.row_labels.clone(),
            col_labels: self.col_labels.clone(),
            values,
        }
    }

    /// Label of lane `index` along `margin` (a row label for `Rows`, a column label for `Columns`).
    pub(crate) fn margin_label(&self, margin: Margin, index: usize) -> &str {
        match margin {
            Margin::Rows => &self.row_labels[index],
            Margin::Columns => &self.col_labels[index],
        }
    }
}

fn check_unique(labels: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(labels.len());
    for label in labels {
        if !seen.insert(label.as_str()) {
            return Err(AnalysisError::DuplicateLabel(label.clone()));
        }
    }
    Ok(())
}

/// Row label given to unlabeled data (0-based index in, `S1`-style label out).
pub(crate) fn generated_row_label(i: usize) -> String {
    format!("S{}", i + 1)
}

pub(crate) fn generated_col_label(j: usize) -> String {
    format!("V{}", j + 1)
}

pub(crate) fn check_finite<R, C>(
    values: &Array2<f64>,
    operation: &'static str,
    row_label: R,
    col_label: C,
) -> Result<()>
where
    R: Fn(usize) -> String,
    C: Fn(usize) -> String,
{
    match values.indexed_iter().find(|(_, v)| !v.is_finite()) {
        Some(((i, j), value)) if value.is_nan() => Err(AnalysisError::MissingValue {
            row: row_label(i),
            column: col_label(j),
        }),
        Some(((i, j), &value)) => Err(AnalysisError::Domain {
            operation,
            row: row_label(i),
            column: col_label(j),
            value,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn rejects_label_count_mismatch() {
        let err = LabeledMatrix::new(labels("r", 3), labels("c", 2), Array2::zeros((2, 2))).unwrap_err();
        assert!(matches!(err, AnalysisError::DimensionMismatch { expected: 2, found: 3, .. }));
    }

    #[test]
    fn rejects_duplicate_labels() {
        let cols = vec!["sp".to_string(), "sp".to_string()];
        let err = LabeledMatrix::new(labels("r", 2), cols, Array2::zeros((2, 2))).unwrap_err();
        assert!(matches!(err, AnalysisError::DuplicateLabel(ref l) if l == "sp"));
    }

    #[test]
    fn select_columns_keeps_requested_order() {
        let m = LabeledMatrix::new(
            labels("r", 2),
            vec!["a".into(), "b".into(), "c".into()],
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
        )
        .unwrap();
        let picked = m.select_columns(&["c", "a"]).unwrap();
        assert_eq!(picked.col_labels(), &["c".to_string(), "a".to_string()]);
        assert_eq!(picked.values(), &array![[3.0, 1.0], [6.0, 4.0]]);
        assert!(matches!(m.select_columns(&["zz"]), Err(AnalysisError::UnknownColumn(_))));
    }

    #[test]
    fn ensure_complete_names_first_missing_cell() {
        let m = LabeledMatrix::new(
            vec!["site1".into(), "site2".into()],
            vec!["sp1".into(), "sp2".into()],
            array![[1.0, 2.0], [f64::NAN, 3.0]],
        )
        .unwrap();
        assert_eq!(m.missing_count(), 1);
        match m.ensure_complete() {
            Err(AnalysisError::MissingValue { row, column }) => {
                assert_eq!(row, "site2");
                assert_eq!(column, "sp1");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn ensure_finite_separates_missing_from_infinite() {
        let m = LabeledMatrix::new(
            vec!["site1".into(), "site2".into()],
            vec!["sp1".into(), "sp2".into()],
            array![[1.0, f64::INFINITY], [2.0, 3.0]],
        )
        .unwrap();
        match m.ensure_finite("rda") {
            Err(AnalysisError::Domain { operation, row, column, value }) => {
                assert_eq!((operation, row.as_str(), column.as_str()), ("rda", "site1", "sp2"));
                assert_eq!(value, f64::INFINITY);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        let missing = m.with_values(array![[1.0, 2.0], [f64::NAN, 3.0]]);
        assert!(matches!(missing.ensure_finite("rda"), Err(AnalysisError::MissingValue { .. })));
        assert!(LabeledMatrix::from_array(array![[1.0]]).ensure_finite("rda").is_ok());
    }
}
