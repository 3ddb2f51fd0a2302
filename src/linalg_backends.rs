// src/linalg_backends.rs

use crate::error::{AnalysisError, Result};
use ndarray::{Array1, Array2};
use ndarray_linalg::{Eigh as NdLinalgEigh, SVDInto as NdLinalgSVDInto, UPLO};

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput {
    /// Eigenvalues, sorted in ascending order.
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors as columns of the matrix.
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<f64>,
}

/// Trait for symmetric eigendecomposition (similar to LAPACK's DSYEVD).
/// Implementers may assume `matrix` is symmetric and read its upper triangle.
pub trait BackendEigh {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput>;
}

/// Output of a Singular Value Decomposition.
#[derive(Debug)]
pub struct SVDOutput {
    pub u: Option<Array2<f64>>,
    /// Singular values in descending order.
    pub s: Array1<f64>,
    pub vt: Option<Array2<f64>>,
}

/// Trait for Singular Value Decomposition.
pub trait BackendSVD {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput>;
}

/// Default backend, delegating to ndarray-linalg and whichever LAPACK the
/// `backend_*` feature links.
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

fn to_analysis_error<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> AnalysisError {
    move |e| AnalysisError::Linalg(format!("{}: {}", context, e))
}

impl BackendEigh for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput> {
        if matrix.nrows() != matrix.ncols() {
            return Err(AnalysisError::DimensionMismatch {
                context: "eigendecomposition requires a square matrix",
                expected: matrix.nrows(),
                found: matrix.ncols(),
            });
        }
        if matrix.is_empty() {
            return Ok(EighOutput { eigenvalues: Array1::zeros(0), eigenvectors: Array2::zeros((0, 0)) });
        }
        let (eigenvalues, eigenvectors) = matrix
            .eigh(UPLO::Upper)
            .map_err(to_analysis_error("symmetric eigendecomposition"))?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

impl BackendSVD for NdarrayLinAlgBackend {
    fn svd_into(&self, matrix: Array2<f64>, compute_u: bool, compute_v: bool) -> Result<SVDOutput> {
        if matrix.is_empty() {
            let (n, p) = matrix.dim();
            return Ok(SVDOutput {
                u: compute_u.then(|| Array2::zeros((n, 0))),
                s: Array1::zeros(0),
                vt: compute_v.then(|| Array2::zeros((0, p))),
            });
        }
        let (u, s, vt) = matrix
            .svd_into(compute_u, compute_v)
            .map_err(to_analysis_error("singular value decomposition"))?;
        Ok(SVDOutput { u, s, vt })
    }
}
