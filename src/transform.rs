// src/transform.rs
//! Element-wise transformations. Each output cell depends only on the
//! corresponding input cell; shape and labels are preserved.

use crate::error::{AnalysisError, Result};
use crate::matrix::LabeledMatrix;
use ndarray::Array2;
use std::f64::consts::FRAC_2_PI;

/// Base used by `log_transform` when callers have no preference.
pub const LOG_TRANSFORM_DEFAULT_BASE: f64 = 2.0;

/// Applies `f` to every cell. `f` returns `None` when the value is outside its domain.
fn map_cells<F>(matrix: &LabeledMatrix, operation: &'static str, f: F) -> Result<LabeledMatrix>
where
    F: Fn(f64) -> Option<f64>,
{
    matrix.ensure_complete()?;
    let mut out = Array2::<f64>::zeros(matrix.values().dim());
    for ((i, j), &value) in matrix.values().indexed_iter() {
        out[[i, j]] = f(value).ok_or_else(|| AnalysisError::Domain {
            operation,
            row: matrix.row_labels()[i].clone(),
            column: matrix.col_labels()[j].clone(),
            value,
        })?;
    }
    Ok(matrix.with_values(out))
}

/// Replaces every value greater than 1 with 1. Zero and negative values pass through.
pub fn clamp_to_one(matrix: &LabeledMatrix) -> Result<LabeledMatrix> {
    map_cells(matrix, "clamp_to_one", |x| Some(if x > 1.0 { 1.0 } else { x }))
}

/// Strict binary indicator: 1 where the value is positive, 0 elsewhere.
pub fn presence_absence(matrix: &LabeledMatrix) -> Result<LabeledMatrix> {
    map_cells(matrix, "presence_absence", |x| Some(if x > 0.0 { 1.0 } else { 0.0 }))
}

/// `log_base(x) + 1` for positive values, 0 for everything else.
pub fn log_transform(matrix: &LabeledMatrix, base: f64) -> Result<LabeledMatrix> {
    if !(base.is_finite() && base > 0.0 && base != 1.0) {
        return Err(AnalysisError::InvalidParameter(format!(
            "log base must be positive and different from 1, got {}",
            base
        )));
    }
    let ln_base = base.ln();
    map_cells(matrix, "log_transform", |x| {
        if x > 0.0 {
            Some(x.ln() / ln_base + 1.0)
        } else {
            Some(0.0)
        }
    })
}

pub fn square_root(matrix: &LabeledMatrix) -> Result<LabeledMatrix> {
    map_cells(matrix, "square_root", |x| if x >= 0.0 { Some(x.sqrt()) } else { None })
}

/// Raises every value to `exponent`.
///
/// Negative values are only accepted with integer exponents, and any
/// non-finite result (such as 0 raised to a negative power) is a domain error.
pub fn power(matrix: &LabeledMatrix, exponent: f64) -> Result<LabeledMatrix> {
    if !exponent.is_finite() {
        return Err(AnalysisError::InvalidParameter(format!(
            "exponent must be finite, got {}",
            exponent
        )));
    }
    let integer_exponent = exponent.fract() == 0.0;
    map_cells(matrix, "power", |x| {
        if x < 0.0 && !integer_exponent {
            return None;
        }
        let y = x.powf(exponent);
        if y.is_finite() {
            Some(y)
        } else {
            None
        }
    })
}

/// `(2/π) · asin(sqrt(x))` for proportions in `[0, 1]`, mapping onto `[0, 1]`.
pub fn arcsin_sqrt(matrix: &LabeledMatrix) -> Result<LabeledMatrix> {
    map_cells(matrix, "arcsin_sqrt", |x| {
        if (0.0..=1.0).contains(&x) {
            Some(FRAC_2_PI * x.sqrt().asin())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn m(values: Array2<f64>) -> LabeledMatrix {
        LabeledMatrix::from_array(values)
    }

    #[test]
    fn clamp_to_one_only_touches_values_above_one() {
        let out = clamp_to_one(&m(array![[0.0, 0.5, 3.0], [-2.0, 1.0, 12.0]])).unwrap();
        assert_eq!(out.values(), &array![[0.0, 0.5, 1.0], [-2.0, 1.0, 1.0]]);
    }

    #[test]
    fn presence_absence_is_binary_and_idempotent() {
        let input = m(array![[0.0, 0.2, 7.0], [-1.0, 1.0, 0.0]]);
        let once = presence_absence(&input).unwrap();
        assert_eq!(once.values(), &array![[0.0, 1.0, 1.0], [0.0, 1.0, 0.0]]);
        let twice = presence_absence(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn log_transform_follows_anderson_rule() {
        let out = log_transform(&m(array![[0.0, 1.0, 8.0]]), 2.0).unwrap();
        assert_abs_diff_eq!(out.values()[[0, 0]], 0.0);
        assert_abs_diff_eq!(out.values()[[0, 1]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.values()[[0, 2]], 4.0, epsilon = 1e-12);

        let out10 = log_transform(&m(array![[100.0]]), 10.0).unwrap();
        assert_abs_diff_eq!(out10.values()[[0, 0]], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn log_transform_rejects_bad_base() {
        let input = m(array![[1.0]]);
        assert!(matches!(log_transform(&input, 1.0), Err(AnalysisError::InvalidParameter(_))));
        assert!(matches!(log_transform(&input, -3.0), Err(AnalysisError::InvalidParameter(_))));
    }

    #[test]
    fn log_transform_maps_non_positive_values_to_zero() {
        let out = log_transform(&m(array![[-2.0, 0.0, 4.0]]), 2.0).unwrap();
        assert_eq!(out.values()[[0, 0]], 0.0);
        assert_eq!(out.values()[[0, 1]], 0.0);
        assert_abs_diff_eq!(out.values()[[0, 2]], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn square_root_reports_failing_cell() {
        let input = LabeledMatrix::new(
            vec!["a".into(), "b".into()],
            vec!["x".into()],
            array![[4.0], [-1.0]],
        )
        .unwrap();
        match square_root(&input) {
            Err(AnalysisError::Domain { row, column, value, .. }) => {
                assert_eq!(row, "b");
                assert_eq!(column, "x");
                assert_eq!(value, -1.0);
            }
            other => panic!("expected a domain error, got {:?}", other),
        }
        let ok = square_root(&m(array![[4.0, 0.0]])).unwrap();
        assert_eq!(ok.values(), &array![[2.0, 0.0]]);
    }

    #[test]
    fn power_domain_rules() {
        let out = power(&m(array![[16.0, 0.0]]), 0.25).unwrap();
        assert_abs_diff_eq!(out.values()[[0, 0]], 2.0, epsilon = 1e-12);
        assert_eq!(out.values()[[0, 1]], 0.0);

        let squared = power(&m(array![[-3.0]]), 2.0).unwrap();
        assert_abs_diff_eq!(squared.values()[[0, 0]], 9.0);

        assert!(matches!(power(&m(array![[-3.0]]), 0.5), Err(AnalysisError::Domain { .. })));
        assert!(matches!(power(&m(array![[0.0]]), -1.0), Err(AnalysisError::Domain { .. })));
        assert!(matches!(power(&m(array![[1.0]]), f64::NAN), Err(AnalysisError::InvalidParameter(_))));
    }

    #[test]
    fn arcsin_sqrt_endpoints() {
        let out = arcsin_sqrt(&m(array![[0.0, 1.0, 0.5]])).unwrap();
        assert_eq!(out.values()[[0, 0]], 0.0);
        assert_abs_diff_eq!(out.values()[[0, 1]], 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(out.values()[[0, 2]], 0.5, epsilon = 1e-12);
        assert!(matches!(arcsin_sqrt(&m(array![[1.2]])), Err(AnalysisError::Domain { .. })));
        assert!(matches!(arcsin_sqrt(&m(array![[-0.1]])), Err(AnalysisError::Domain { .. })));
    }

    #[test]
    fn transforms_reject_missing_cells() {
        let input = m(array![[1.0, f64::NAN]]);
        assert!(matches!(square_root(&input), Err(AnalysisError::MissingValue { .. })));
        assert!(matches!(presence_absence(&input), Err(AnalysisError::MissingValue { .. })));
        assert!(matches!(clamp_to_one(&input), Err(AnalysisError::MissingValue { .. })));
    }

    #[test]
    fn transforms_preserve_shape_and_labels() {
        let input = LabeledMatrix::new(
            vec!["north".into(), "south".into()],
            vec!["oak".into(), "ash".into(), "elm".into()],
            array![[0.1, 0.4, 0.9], [0.0, 0.25, 1.0]],
        )
        .unwrap();
        for out in [
            clamp_to_one(&input).unwrap(),
            presence_absence(&input).unwrap(),
            log_transform(&input, LOG_TRANSFORM_DEFAULT_BASE).unwrap(),
            square_root(&input).unwrap(),
            power(&input, 0.5).unwrap(),
            arcsin_sqrt(&input).unwrap(),
        ] {
            assert_eq!(out.row_labels(), input.row_labels());
            assert_eq!(out.col_labels(), input.col_labels());
            assert_eq!(out.values().dim(), input.values().dim());
        }
    }
}
