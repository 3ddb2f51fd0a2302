// src/screening.rs
//! Data screening: per-column summaries, missing-value imputation and the
//! sufficiency filter that drops poorly sampled variables.

use crate::error::{AnalysisError, Result};
use crate::matrix::LabeledMatrix;
use log::{debug, info};
use ndarray::{ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Summary statistics of one column, computed over its present cells.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub label: String,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (divisor n - 1); 0 when a single value is present.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub n_missing: usize,
    pub n_present: usize,
}

/// Which column statistic replaces a missing cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImputeMethod {
    Median,
    Mean,
}

/// Computes mean, median, standard deviation, min and max of every column,
/// ignoring missing cells.
///
/// # Errors
/// `EmptyColumn` if a column has no present values.
pub fn summarize(matrix: &LabeledMatrix) -> Result<Vec<ColumnSummary>> {
    matrix
        .values()
        .axis_iter(Axis(1))
        .zip(matrix.col_labels())
        .map(|(column, label)| summarize_column(column, label))
        .collect()
}

fn summarize_column(column: ArrayView1<'_, f64>, label: &str) -> Result<ColumnSummary> {
    let mut present: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
    let n_present = present.len();
    if n_present == 0 {
        return Err(AnalysisError::EmptyColumn { column: label.to_string() });
    }
    present.sort_by(f64::total_cmp);

    let mean = present.iter().sum::<f64>() / n_present as f64;
    let std_dev = if n_present > 1 {
        let ss: f64 = present.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n_present - 1) as f64).sqrt()
    } else {
        0.0
    };

    Ok(ColumnSummary {
        label: label.to_string(),
        mean,
        median: median_of_sorted(&present),
        std_dev,
        min: present[0],
        max: present[n_present - 1],
        n_missing: column.len() - n_present,
        n_present,
    })
}

/// Median of a non-empty ascending slice; even counts average the two middle values.
fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Replaces each missing cell with its column's median or mean over present cells.
///
/// Present cells are copied unchanged.
///
/// # Errors
/// `EmptyColumn` if a column that needs a fill value has no present values.
pub fn impute_missing(matrix: &LabeledMatrix, method: ImputeMethod) -> Result<LabeledMatrix> {
    let mut values = matrix.values().clone();
    let mut imputed_cells = 0usize;

    for (mut column, label) in values.axis_iter_mut(Axis(1)).zip(matrix.col_labels()) {
        let n_missing = column.iter().filter(|v| v.is_nan()).count();
        if n_missing == 0 {
            continue;
        }
        let summary = summarize_column(column.view(), label)?;
        let fill = match method {
            ImputeMethod::Median => summary.median,
            ImputeMethod::Mean => summary.mean,
        };
        debug!("Imputing {} cells of column '{}' with {:?} {}", n_missing, label, method, fill);
        column.mapv_inplace(|v| if v.is_nan() { fill } else { v });
        imputed_cells += n_missing;
    }

    info!(
        "Imputed {} missing cells ({:?}) across {} columns.",
        imputed_cells,
        method,
        matrix.ncols()
    );
    Ok(matrix.with_values(values))
}

/// Fraction of missing cells per column, in column order.
pub fn missing_fractions(matrix: &LabeledMatrix) -> Vec<(String, f64)> {
    let n_rows = matrix.nrows();
    matrix
        .values()
        .axis_iter(Axis(1))
        .zip(matrix.col_labels())
        .map(|(column, label)| {
            let n_missing = column.iter().filter(|v| v.is_nan()).count();
            let fraction = if n_rows == 0 { 0.0 } else { n_missing as f64 / n_rows as f64 };
            (label.clone(), fraction)
        })
        .collect()
}

/// Drops every column whose missing fraction is at or above `max_missing_fraction`.
///
/// Call this on the matrix before imputation; afterwards no column has
/// missing cells and nothing would be removed. Rows and the order of the
/// remaining columns are unchanged.
///
/// # Errors
/// `InvalidParameter` if the threshold lies outside `[0, 1]`.
pub fn filter_by_sufficiency(matrix: &LabeledMatrix, max_missing_fraction: f64) -> Result<LabeledMatrix> {
    if !(0.0..=1.0).contains(&max_missing_fraction) {
        return Err(AnalysisError::InvalidParameter(format!(
            "max_missing_fraction must lie in [0, 1], got {}",
            max_missing_fraction
        )));
    }

    let mut keep = Vec::with_capacity(matrix.ncols());
    for (j, (label, fraction)) in missing_fractions(matrix).into_iter().enumerate() {
        if fraction >= max_missing_fraction {
            debug!("Dropping column '{}' ({:.1}% missing).", label, fraction * 100.0);
        } else {
            keep.push(j);
        }
    }

    info!(
        "Sufficiency filter at {:.3}: kept {} of {} columns.",
        max_missing_fraction,
        keep.len(),
        matrix.ncols()
    );
    matrix.select_column_indices(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    const NA: f64 = f64::NAN;

    fn sample_matrix() -> LabeledMatrix {
        LabeledMatrix::new(
            vec!["s1".into(), "s2".into(), "s3".into()],
            vec!["col1".into(), "col2".into(), "col3".into()],
            array![[1.0, 2.0, NA], [3.0, NA, 6.0], [5.0, 4.0, 7.0]],
        )
        .unwrap()
    }

    #[test]
    fn median_imputation_fills_column_medians() {
        let imputed = impute_missing(&sample_matrix(), ImputeMethod::Median).unwrap();
        assert_eq!(imputed.values(), &array![[1.0, 2.0, 6.5], [3.0, 3.0, 6.0], [5.0, 4.0, 7.0]]);
        assert_eq!(imputed.row_labels(), sample_matrix().row_labels());
        assert_eq!(imputed.col_labels(), sample_matrix().col_labels());
    }

    #[test]
    fn mean_imputation_fills_column_means() {
        let m = LabeledMatrix::from_array(array![[1.0], [NA], [2.0], [6.0]]);
        let imputed = impute_missing(&m, ImputeMethod::Mean).unwrap();
        assert_abs_diff_eq!(imputed.values()[[1, 0]], 3.0, epsilon = 1e-12);
        assert_eq!(imputed.values()[[3, 0]], 6.0);
    }

    #[test]
    fn summary_ignores_missing_cells() {
        let summaries = summarize(&sample_matrix()).unwrap();
        assert_eq!(summaries.len(), 3);

        let col2 = &summaries[1];
        assert_eq!(col2.n_missing, 1);
        assert_eq!(col2.n_present, 2);
        assert_abs_diff_eq!(col2.mean, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(col2.median, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(col2.std_dev, 2.0_f64.sqrt(), epsilon = 1e-12);
        assert_eq!(col2.min, 2.0);
        assert_eq!(col2.max, 4.0);

        let col1 = &summaries[0];
        assert_abs_diff_eq!(col1.std_dev, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn summary_of_all_missing_column_fails() {
        let m = LabeledMatrix::new(
            vec!["a".into(), "b".into()],
            vec!["ok".into(), "empty".into()],
            array![[1.0, NA], [2.0, NA]],
        )
        .unwrap();
        match summarize(&m) {
            Err(AnalysisError::EmptyColumn { column }) => assert_eq!(column, "empty"),
            other => panic!("expected EmptyColumn, got {:?}", other),
        }
        assert!(matches!(
            impute_missing(&m, ImputeMethod::Median),
            Err(AnalysisError::EmptyColumn { .. })
        ));
    }

    #[test]
    fn sufficiency_filter_removes_columns_at_threshold() {
        let m = LabeledMatrix::new(
            vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()],
            vec!["full".into(), "half".into(), "quarter".into()],
            array![[1.0, NA, 1.0], [2.0, NA, NA], [3.0, 1.0, 2.0], [4.0, 2.0, 3.0]],
        )
        .unwrap();
        let filtered = filter_by_sufficiency(&m, 0.5).unwrap();
        assert_eq!(filtered.col_labels(), &["full".to_string(), "quarter".to_string()]);
        assert_eq!(filtered.row_labels(), m.row_labels());
        assert_eq!(filtered.nrows(), 4);
    }

    #[test]
    fn sufficiency_filter_rejects_out_of_range_threshold() {
        let m = sample_matrix();
        assert!(matches!(filter_by_sufficiency(&m, 1.5), Err(AnalysisError::InvalidParameter(_))));
        assert!(matches!(filter_by_sufficiency(&m, -0.1), Err(AnalysisError::InvalidParameter(_))));
    }

    #[test]
    fn zero_threshold_drops_every_column() {
        let filtered = filter_by_sufficiency(&sample_matrix(), 0.0).unwrap();
        assert_eq!(filtered.ncols(), 0);
        assert_eq!(filtered.nrows(), 3);
    }
}
