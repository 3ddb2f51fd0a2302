// src/standardize.rs
//! Standardizations rescale each cell by an aggregate of its row or column
//! (see [`Margin`]). A zero divisor is an error, never a silent zero.

use crate::error::{AnalysisError, Result};
use crate::matrix::{LabeledMatrix, Margin};
use ndarray::{ArrayView1, ArrayViewMut1};

/// Rewrites every lane along `margin` in place with `f`, which may fail with
/// a degenerate-axis error for that lane.
fn rescale_lanes<F>(matrix: &LabeledMatrix, margin: Margin, operation: &'static str, f: F) -> Result<LabeledMatrix>
where
    F: Fn(ArrayViewMut1<'_, f64>) -> bool,
{
    matrix.ensure_complete()?;
    let mut values = matrix.values().clone();
    for (index, lane) in values.axis_iter_mut(margin.iter_axis()).enumerate() {
        if !f(lane) {
            return Err(AnalysisError::DegenerateAxis {
                operation,
                margin,
                label: matrix.margin_label(margin, index).to_string(),
            });
        }
    }
    Ok(matrix.with_values(values))
}

fn lane_mean_sd(lane: ArrayView1<'_, f64>) -> (f64, f64) {
    let n = lane.len() as f64;
    let mean = lane.sum() / n;
    if lane.len() < 2 {
        return (mean, 0.0);
    }
    let ss: f64 = lane.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, (ss / (n - 1.0)).sqrt())
}

/// `(x - mean) / sd` with the sample standard deviation (divisor n - 1).
pub fn z_score(matrix: &LabeledMatrix, margin: Margin) -> Result<LabeledMatrix> {
    rescale_lanes(matrix, margin, "z_score", |mut lane| {
        let (mean, sd) = lane_mean_sd(lane.view());
        if sd == 0.0 || !sd.is_finite() {
            return false;
        }
        lane.mapv_inplace(|x| (x - mean) / sd);
        true
    })
}

/// `x / sum` so that every lane sums to one.
pub fn total_standardize(matrix: &LabeledMatrix, margin: Margin) -> Result<LabeledMatrix> {
    rescale_lanes(matrix, margin, "total_standardize", |mut lane| {
        let total = lane.sum();
        if total == 0.0 {
            return false;
        }
        lane.mapv_inplace(|x| x / total);
        true
    })
}

/// `x / max` so that every lane's largest value becomes one.
pub fn max_standardize(matrix: &LabeledMatrix, margin: Margin) -> Result<LabeledMatrix> {
    rescale_lanes(matrix, margin, "max_standardize", |mut lane| {
        let max = lane.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max == 0.0 || !max.is_finite() {
            return false;
        }
        lane.mapv_inplace(|x| x / max);
        true
    })
}

/// `sqrt(x / sum)`: the square root of the total standardization.
///
/// Negative cells have no Hellinger transform and are rejected.
pub fn hellinger(matrix: &LabeledMatrix, margin: Margin) -> Result<LabeledMatrix> {
    matrix.ensure_complete()?;
    if let Some(((i, j), &value)) = matrix.values().indexed_iter().find(|(_, v)| **v < 0.0) {
        return Err(AnalysisError::Domain {
            operation: "hellinger",
            row: matrix.row_labels()[i].clone(),
            column: matrix.col_labels()[j].clone(),
            value,
        });
    }
    rescale_lanes(matrix, margin, "hellinger", |mut lane| {
        let total = lane.sum();
        if total == 0.0 {
            return false;
        }
        lane.mapv_inplace(|x| (x / total).sqrt());
        true
    })
}

/// Wisconsin double standardization: species (columns) by their maxima,
/// then sites (rows) by their totals.
pub fn wisconsin(matrix: &LabeledMatrix) -> Result<LabeledMatrix> {
    let by_species_max = max_standardize(matrix, Margin::Columns)?;
    total_standardize(&by_species_max, Margin::Rows)
}

/// `(x - min) / (max - min)`, mapping every lane onto `[0, 1]`.
pub fn range_standardize(matrix: &LabeledMatrix, margin: Margin) -> Result<LabeledMatrix> {
    rescale_lanes(matrix, margin, "range_standardize", |mut lane| {
        let min = lane.iter().copied().fold(f64::INFINITY, f64::min);
        let max = lane.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if range == 0.0 || !range.is_finite() {
            return false;
        }
        lane.mapv_inplace(|x| (x - min) / range);
        true
    })
}

/// Chord (normalize) standardization: `x / sqrt(sum(x^2))`, giving unit-length lanes.
pub fn chord(matrix: &LabeledMatrix, margin: Margin) -> Result<LabeledMatrix> {
    rescale_lanes(matrix, margin, "chord", |mut lane| {
        let norm = lane.dot(&lane).sqrt();
        if norm == 0.0 {
            return false;
        }
        lane.mapv_inplace(|x| x / norm);
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2, Axis};

    fn abundance() -> LabeledMatrix {
        LabeledMatrix::new(
            vec!["s1".into(), "s2".into(), "s3".into()],
            vec!["sp1".into(), "sp2".into(), "sp3".into()],
            array![[4.0, 0.0, 1.0], [2.0, 3.0, 5.0], [0.0, 9.0, 2.0]],
        )
        .unwrap()
    }

    #[test]
    fn total_standardize_columns_sum_to_one() {
        let out = total_standardize(&abundance(), Margin::Columns).unwrap();
        for sum in out.values().sum_axis(Axis(0)).iter() {
            assert_abs_diff_eq!(*sum, 1.0, epsilon = 1e-9);
        }
        let rows = total_standardize(&abundance(), Margin::Rows).unwrap();
        for sum in rows.values().sum_axis(Axis(1)).iter() {
            assert_abs_diff_eq!(*sum, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn z_score_lanes_have_zero_mean_unit_sd() {
        for margin in [Margin::Rows, Margin::Columns] {
            let out = z_score(&abundance(), margin).unwrap();
            for lane in out.values().axis_iter(margin.iter_axis()) {
                let (mean, sd) = lane_mean_sd(lane);
                assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-9);
                assert_abs_diff_eq!(sd, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn zero_divisors_are_degenerate() {
        let m = LabeledMatrix::new(
            vec!["s1".into(), "s2".into()],
            vec!["common".into(), "absent".into()],
            array![[3.0, 0.0], [1.0, 0.0]],
        )
        .unwrap();
        for result in [
            total_standardize(&m, Margin::Columns),
            max_standardize(&m, Margin::Columns),
            hellinger(&m, Margin::Columns),
            z_score(&m, Margin::Columns),
            range_standardize(&m, Margin::Columns),
            chord(&m, Margin::Columns),
        ] {
            match result {
                Err(AnalysisError::DegenerateAxis { margin, label, .. }) => {
                    assert_eq!(margin, Margin::Columns);
                    assert_eq!(label, "absent");
                }
                other => panic!("expected DegenerateAxis, got {:?}", other),
            }
        }
    }

    #[test]
    fn hellinger_is_sqrt_of_total() {
        let total = total_standardize(&abundance(), Margin::Rows).unwrap();
        let hel = hellinger(&abundance(), Margin::Rows).unwrap();
        let expected = total.values().mapv(f64::sqrt);
        for (a, b) in hel.values().iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
        let negative = LabeledMatrix::from_array(array![[1.0, -1.0]]);
        assert!(matches!(hellinger(&negative, Margin::Rows), Err(AnalysisError::Domain { .. })));
    }

    #[test]
    fn wisconsin_is_column_max_then_row_total() {
        let out = wisconsin(&abundance()).unwrap();
        // column maxima 4, 9, 5
        let scaled: Array2<f64> = array![
            [1.0, 0.0, 0.2],
            [0.5, 1.0 / 3.0, 1.0],
            [0.0, 1.0, 0.4]
        ];
        for (i, row) in scaled.axis_iter(Axis(0)).enumerate() {
            let total = row.sum();
            for j in 0..3 {
                assert_abs_diff_eq!(out.values()[[i, j]], row[j] / total, epsilon = 1e-12);
            }
        }
        let composed = total_standardize(&max_standardize(&abundance(), Margin::Columns).unwrap(), Margin::Rows).unwrap();
        assert_eq!(out, composed);
    }

    #[test]
    fn max_range_and_chord() {
        let out = max_standardize(&abundance(), Margin::Rows).unwrap();
        assert_abs_diff_eq!(out.values()[[1, 2]], 1.0);
        assert_abs_diff_eq!(out.values()[[1, 0]], 0.4, epsilon = 1e-12);

        let ranged = range_standardize(&abundance(), Margin::Columns).unwrap();
        assert_abs_diff_eq!(ranged.values()[[2, 2]], 0.25, epsilon = 1e-12);

        let chorded = chord(&abundance(), Margin::Rows).unwrap();
        for row in chorded.values().axis_iter(Axis(0)) {
            assert_abs_diff_eq!(row.dot(&row), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn standardizations_preserve_shape_and_labels() {
        let input = LabeledMatrix::new(
            vec!["bog".into(), "fen".into(), "heath".into(), "dune".into()],
            vec!["moss".into(), "sedge".into(), "heather".into()],
            array![[3.0, 1.0, 0.5], [0.0, 4.0, 2.0], [1.0, 2.0, 6.0], [5.0, 0.5, 1.0]],
        )
        .unwrap();
        for margin in [Margin::Rows, Margin::Columns] {
            for out in [
                z_score(&input, margin).unwrap(),
                total_standardize(&input, margin).unwrap(),
                max_standardize(&input, margin).unwrap(),
                hellinger(&input, margin).unwrap(),
                wisconsin(&input).unwrap(),
                range_standardize(&input, margin).unwrap(),
                chord(&input, margin).unwrap(),
            ] {
                assert_eq!(out.row_labels(), input.row_labels());
                assert_eq!(out.col_labels(), input.col_labels());
                assert_eq!(out.values().dim(), input.values().dim());
            }
        }
    }

    #[test]
    fn standardizations_reject_missing_cells() {
        let m = LabeledMatrix::from_array(array![[1.0, f64::NAN], [2.0, 3.0]]);
        assert!(matches!(z_score(&m, Margin::Rows), Err(AnalysisError::MissingValue { .. })));
        assert!(matches!(wisconsin(&m), Err(AnalysisError::MissingValue { .. })));
    }
}
