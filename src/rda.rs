// src/rda.rs
//! Redundancy analysis (RDA): multivariate linear regression of a response
//! matrix on a predictor matrix, followed by an eigendecomposition of the
//! fitted values. Partial RDA first removes the effect of conditioning
//! variables from both response and predictors.

use crate::error::{AnalysisError, Result};
use crate::linalg_backends::{BackendEigh, BackendSVD, NdarrayLinAlgBackend};
use crate::matrix::{check_finite, generated_col_label, generated_row_label, LabeledMatrix};
use log::{debug, trace, warn};
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Numerical settings of an RDA fit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RdaConfig {
    /// Divide every response column by its standard deviation after centering
    /// (a correlation rather than covariance RDA). Constant columns are left unscaled.
    pub scale_response: bool,
    /// Singular values of the predictor matrix at or below
    /// `rank_tolerance` times the reference norm count as zero.
    pub rank_tolerance: f64,
}

impl Default for RdaConfig {
    fn default() -> Self {
        RdaConfig {
            scale_response: false,
            rank_tolerance: 1e-7,
        }
    }
}

/// The outcome of fitting one constrained ordination.
#[derive(Clone, Debug, Serialize)]
pub struct OrdinationResult {
    /// Constrained inertia over total inertia.
    pub r_squared: f64,
    /// Adjusted R². May be negative; never clamped.
    pub adj_r_squared: f64,
    /// Eigenvalues of the constrained axes, descending. They sum to `constrained_inertia`.
    pub eigenvalues: Array1<f64>,
    /// Fitted site scores on the constrained axes.
    /// Shape: `(n_samples, eigenvalues.len())`
    pub site_scores: Array2<f64>,
    pub total_inertia: f64,
    /// Inertia explained by the conditioning variables (0 without conditioning).
    pub conditional_inertia: f64,
    pub constrained_inertia: f64,
    pub residual_inertia: f64,
    /// Rank of the predictor matrix after conditioning.
    pub rank: usize,
    /// Rank of the conditioning matrix (0 without conditioning).
    pub conditioning_rank: usize,
    pub n_samples: usize,
}

/// A constrained ordination method. Variance partitioning only depends on this trait.
pub trait Ordination: Sync {
    /// Fits `response` against `predictors`, optionally after partialling out `conditioning`.
    /// All matrices have samples as rows.
    fn fit(
        &self,
        response: &Array2<f64>,
        predictors: &Array2<f64>,
        conditioning: Option<&Array2<f64>>,
    ) -> Result<OrdinationResult>;
}

/// Redundancy analysis over a pluggable linear algebra backend.
#[derive(Clone, Debug, Default)]
pub struct Rda<B = NdarrayLinAlgBackend> {
    config: RdaConfig,
    backend: B,
}

impl Rda<NdarrayLinAlgBackend> {
    pub fn new(config: RdaConfig) -> Self {
        Self::with_backend(config, NdarrayLinAlgBackend)
    }
}

/// Centered (and optionally scaled) response and the orthonormal bases needed
/// to fit or permute a model. Shared by the fit and the permutation test.
#[derive(Debug)]
pub(crate) struct PreparedModel {
    /// Response after centering, optional scaling and removal of the conditioning effect.
    pub response: Array2<f64>,
    /// Orthonormal basis of the predictor space after conditioning. Shape: `(n, rank)`
    pub predictor_basis: Array2<f64>,
    /// Orthonormal basis of the conditioning space. Shape: `(n, conditioning_rank)`
    pub conditioning_basis: Option<Array2<f64>>,
    pub total_inertia: f64,
    pub conditional_inertia: f64,
    pub n_samples: usize,
}

impl PreparedModel {
    pub fn rank(&self) -> usize {
        self.predictor_basis.ncols()
    }

    pub fn conditioning_rank(&self) -> usize {
        self.conditioning_basis.as_ref().map_or(0, |b| b.ncols())
    }
}

impl<B: BackendEigh + BackendSVD + Sync> Rda<B> {
    pub fn with_backend(config: RdaConfig, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &RdaConfig {
        &self.config
    }

    /// Fits labeled matrices, checking that all of them list the same sample units in the same order.
    pub fn fit_labeled(
        &self,
        response: &LabeledMatrix,
        predictors: &LabeledMatrix,
        conditioning: Option<&LabeledMatrix>,
    ) -> Result<OrdinationResult> {
        check_same_rows(response, predictors)?;
        response.ensure_finite("rda response")?;
        predictors.ensure_finite("rda predictors")?;
        if let Some(z) = conditioning {
            check_same_rows(response, z)?;
            z.ensure_finite("rda conditioning")?;
        }
        self.fit(response.values(), predictors.values(), conditioning.map(|z| z.values()))
    }

    pub(crate) fn prepare(
        &self,
        response: &Array2<f64>,
        predictors: &Array2<f64>,
        conditioning: Option<&Array2<f64>>,
    ) -> Result<PreparedModel> {
        let n = response.nrows();
        if n < 2 {
            return Err(AnalysisError::InvalidParameter(format!(
                "RDA needs at least 2 samples, got {}",
                n
            )));
        }
        if response.ncols() == 0 || predictors.ncols() == 0 {
            return Err(AnalysisError::InvalidParameter(
                "RDA needs at least one response and one predictor column".to_string(),
            ));
        }
        check_rows("predictor rows vs response rows", n, predictors)?;
        check_cells("rda response", response)?;
        check_cells("rda predictors", predictors)?;
        if let Some(z) = conditioning {
            check_rows("conditioning rows vs response rows", n, z)?;
            check_cells("rda conditioning", z)?;
        }

        let mut y = center_columns(response);
        if self.config.scale_response {
            scale_columns(&mut y);
        }
        let total_ss = sum_of_squares(&y);
        if total_ss <= 0.0 {
            return Err(AnalysisError::InvalidParameter(
                "response matrix has zero total inertia".to_string(),
            ));
        }

        let x = center_columns(predictors);
        // Reference norm: centered predictors before conditioning, so that predictors
        // collinear with the conditioning variables drop out of the rank while a large
        // constant offset does not hide a predictor's spread.
        let predictor_norm = frobenius_norm(&x);
        let (y, x, conditioning_basis, conditional_ss) = match conditioning {
            Some(z) => {
                let z_centered = center_columns(z);
                let z_basis = self.orthonormal_basis(&z_centered, frobenius_norm(&z_centered))?;
                let y_explained = project(&z_basis, &y);
                let conditional_ss = sum_of_squares(&y_explained);
                let y_res = &y - &y_explained;
                let x_res = &x - &project(&z_basis, &x);
                (y_res, x_res, Some(z_basis), conditional_ss)
            }
            None => (y, x, None, 0.0),
        };

        let predictor_basis = self.orthonormal_basis(&x, predictor_norm)?;
        if predictor_basis.ncols() < predictors.ncols() {
            warn!(
                "Predictor matrix is rank deficient: {} columns, rank {} after centering{}.",
                predictors.ncols(),
                predictor_basis.ncols(),
                if conditioning.is_some() { " and conditioning" } else { "" }
            );
        }

        let df = (n - 1) as f64;
        Ok(PreparedModel {
            response: y,
            predictor_basis,
            conditioning_basis,
            total_inertia: total_ss / df,
            conditional_inertia: conditional_ss / df,
            n_samples: n,
        })
    }

    /// Orthonormal basis of the column space of `matrix`, dropping directions whose singular
    /// value is at or below `rank_tolerance * max(s_max, reference_norm)`.
    fn orthonormal_basis(&self, matrix: &Array2<f64>, reference_norm: f64) -> Result<Array2<f64>> {
        let n = matrix.nrows();
        let svd = self.backend.svd_into(matrix.to_owned(), true, false)?;
        let u = svd
            .u
            .ok_or_else(|| AnalysisError::Linalg("SVD did not return left singular vectors".to_string()))?;
        let s_max = svd.s.iter().copied().fold(0.0_f64, f64::max);
        let threshold = self.config.rank_tolerance * s_max.max(reference_norm);
        let rank = svd.s.iter().take_while(|&&sv| sv > threshold).count();
        trace!("Basis of {}x{} matrix: rank {} (threshold {:.3e}).", n, matrix.ncols(), rank, threshold);
        if rank == 0 {
            return Ok(Array2::zeros((n, 0)));
        }
        Ok(u.slice(s![.., ..rank]).to_owned())
    }

    /// Eigenvalues and site scores of the fitted values, keeping at most `rank` positive axes.
    fn constrained_axes(&self, fitted: &Array2<f64>, rank: usize) -> Result<(Array1<f64>, Array2<f64>)> {
        let n_samples = fitted.nrows();
        let n_features = fitted.ncols();
        if rank == 0 {
            return Ok((Array1::zeros(0), Array2::zeros((n_samples, 0))));
        }
        let df = (n_samples - 1) as f64;

        // Decide which covariance trick to use
        //  - If p <= n, eigendecompose the p×p covariance (Ŷ^T Ŷ)/(n-1)
        //  - If p > n, eigendecompose the n×n Gram matrix (Ŷ Ŷ^T)/(n-1)
        let small_side = n_features <= n_samples;
        let cross = if small_side {
            fitted.t().dot(fitted) / df
        } else {
            fitted.dot(&fitted.t()) / df
        };
        let eig = self.backend.eigh_upper(&cross)?;

        let mut eig_pairs: Vec<(f64, Array1<f64>)> = eig
            .eigenvalues
            .into_iter()
            .zip(eig.eigenvectors.columns().into_iter().map(|col| col.to_owned()))
            .collect();
        eig_pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let largest = eig_pairs.first().map_or(0.0, |(v, _)| *v);
        let threshold = largest * self.config.rank_tolerance;
        let kept = eig_pairs
            .iter()
            .take(rank)
            .take_while(|(val, _)| *val > threshold && *val > 0.0)
            .count();

        let mut eigenvalues = Array1::<f64>::zeros(kept);
        let mut scores = Array2::<f64>::zeros((n_samples, kept));
        for (k, (eigval, vector)) in eig_pairs.into_iter().take(kept).enumerate() {
            eigenvalues[k] = eigval;
            let score = if small_side {
                fitted.dot(&vector)
            } else {
                // u_k scaled by its singular value sqrt(lambda_k * (n-1))
                vector.mapv(|x| x * (eigval * df).sqrt())
            };
            scores.column_mut(k).assign(&score);
        }
        Ok((eigenvalues, scores))
    }
}

impl<B: BackendEigh + BackendSVD + Sync> Ordination for Rda<B> {
    fn fit(
        &self,
        response: &Array2<f64>,
        predictors: &Array2<f64>,
        conditioning: Option<&Array2<f64>>,
    ) -> Result<OrdinationResult> {
        let model = self.prepare(response, predictors, conditioning)?;
        let n = model.n_samples;
        let rank = model.rank();
        let conditioning_rank = model.conditioning_rank();
        debug!(
            "RDA fit: {} samples, {} response columns, {} predictors (rank {}), conditioning rank {}.",
            n,
            response.ncols(),
            predictors.ncols(),
            rank,
            conditioning_rank
        );

        let fitted = project(&model.predictor_basis, &model.response);
        let df = (n - 1) as f64;
        let constrained_inertia = sum_of_squares(&fitted) / df;
        let total = model.total_inertia;
        let conditional = model.conditional_inertia;
        let residual_inertia = (total - conditional - constrained_inertia).max(0.0);

        let (eigenvalues, site_scores) = self.constrained_axes(&fitted, rank)?;

        let r_squared = constrained_inertia / total;
        let adj_r_squared = if conditioning.is_some() {
            let full = adjusted_r_squared((conditional + constrained_inertia) / total, n, rank + conditioning_rank)?;
            let conditioning_only = adjusted_r_squared(conditional / total, n, conditioning_rank)?;
            full - conditioning_only
        } else {
            adjusted_r_squared(r_squared, n, rank)?
        };

        Ok(OrdinationResult {
            r_squared,
            adj_r_squared,
            eigenvalues,
            site_scores,
            total_inertia: total,
            conditional_inertia: conditional,
            constrained_inertia,
            residual_inertia,
            rank,
            conditioning_rank,
            n_samples: n,
        })
    }
}

/// Ezekiel's adjustment: `1 - (1 - R²)(n - 1)/(n - m - 1)`.
pub fn adjusted_r_squared(r_squared: f64, n_samples: usize, rank: usize) -> Result<f64> {
    if n_samples <= rank + 1 {
        return Err(AnalysisError::InsufficientDegreesOfFreedom { n_samples, rank });
    }
    let n = n_samples as f64;
    let m = rank as f64;
    Ok(1.0 - (1.0 - r_squared) * (n - 1.0) / (n - m - 1.0))
}

pub(crate) fn center_columns(matrix: &Array2<f64>) -> Array2<f64> {
    match matrix.mean_axis(Axis(0)) {
        Some(mean) => matrix - &mean,
        None => matrix.to_owned(),
    }
}

fn scale_columns(matrix: &mut Array2<f64>) {
    let n = matrix.nrows();
    for mut column in matrix.axis_iter_mut(Axis(1)) {
        let sd = (column.dot(&column) / (n - 1) as f64).sqrt();
        if sd > 1e-12 {
            column.mapv_inplace(|x| x / sd);
        }
    }
}

/// `basis · (basisᵀ · y)`: orthogonal projection of `y` onto the span of an orthonormal basis.
pub(crate) fn project(basis: &Array2<f64>, y: &Array2<f64>) -> Array2<f64> {
    if basis.ncols() == 0 {
        return Array2::zeros(y.dim());
    }
    basis.dot(&basis.t().dot(y))
}

pub(crate) fn sum_of_squares(matrix: &Array2<f64>) -> f64 {
    matrix.iter().map(|v| v * v).sum()
}

fn frobenius_norm(matrix: &Array2<f64>) -> f64 {
    sum_of_squares(matrix).sqrt()
}

fn check_rows(context: &'static str, expected: usize, matrix: &Array2<f64>) -> Result<()> {
    if matrix.nrows() != expected {
        return Err(AnalysisError::DimensionMismatch {
            context,
            expected,
            found: matrix.nrows(),
        });
    }
    Ok(())
}

/// Unlabeled input is reported with the labels `LabeledMatrix::from_array` would give it.
fn check_cells(operation: &'static str, matrix: &Array2<f64>) -> Result<()> {
    check_finite(matrix, operation, generated_row_label, generated_col_label)
}

pub(crate) fn check_same_rows(a: &LabeledMatrix, b: &LabeledMatrix) -> Result<()> {
    if a.nrows() != b.nrows() {
        return Err(AnalysisError::DimensionMismatch {
            context: "sample units of response vs explanatory matrix",
            expected: a.nrows(),
            found: b.nrows(),
        });
    }
    let mismatch = a
        .row_labels()
        .iter()
        .zip(b.row_labels())
        .position(|(x, y)| x != y);
    if let Some(i) = mismatch {
        return Err(AnalysisError::InvalidParameter(format!(
            "sample units differ at position {}: '{}' vs '{}'",
            i,
            a.row_labels()[i],
            b.row_labels()[i]
        )));
    }
    Ok(())
}

