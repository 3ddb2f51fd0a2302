// src/permutation.rs
//! Permutation test of a (partial) RDA model. The pseudo-F statistic of the
//! observed model is compared with the statistics obtained after randomly
//! permuting the rows of the response (residualized on the conditioning
//! variables, if any).

use crate::error::{AnalysisError, Result};
use crate::linalg_backends::{BackendEigh, BackendSVD, NdarrayLinAlgBackend};
use crate::rda::{project, sum_of_squares, PreparedModel, Rda, RdaConfig};
use log::{debug, info};
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Settings of a permutation test.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PermutationConfig {
    /// Number of random permutations.
    pub iterations: usize,
    /// Seed for the random number generator. Permutation `i` is drawn from a
    /// generator seeded with `seed + i`, so results do not depend on thread scheduling.
    pub seed: u64,
}

impl Default for PermutationConfig {
    fn default() -> Self {
        PermutationConfig {
            iterations: 999,
            seed: 2025,
        }
    }
}

/// Result of a permutation test.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PermutationOutcome {
    /// Observed pseudo-F.
    pub statistic: f64,
    /// `(hits + 1) / (iterations + 1)`, where hits counts permuted statistics at least as large.
    pub p_value: f64,
    pub permutations: usize,
    pub df_model: usize,
    pub df_residual: usize,
}

/// A significance test of a constrained ordination model.
pub trait SignificanceTest: Sync {
    fn test(
        &self,
        response: &Array2<f64>,
        predictors: &Array2<f64>,
        conditioning: Option<&Array2<f64>>,
    ) -> Result<PermutationOutcome>;
}

/// Permutation test of RDA models.
#[derive(Clone, Debug, Default)]
pub struct PermutationTest<B = NdarrayLinAlgBackend> {
    rda: Rda<B>,
    config: PermutationConfig,
}

impl PermutationTest<NdarrayLinAlgBackend> {
    pub fn new(rda_config: RdaConfig, config: PermutationConfig) -> Self {
        Self::with_rda(Rda::new(rda_config), config)
    }
}

impl<B: BackendEigh + BackendSVD + Sync> PermutationTest<B> {
    pub fn with_rda(rda: Rda<B>, config: PermutationConfig) -> Self {
        Self { rda, config }
    }

    pub fn config(&self) -> &PermutationConfig {
        &self.config
    }
}

/// Constrained and residual sums of squares of `response` for a prepared model.
fn split_sum_of_squares(model: &PreparedModel, response: &Array2<f64>) -> (f64, f64) {
    let constrained = sum_of_squares(&project(&model.predictor_basis, response));
    let residual = (sum_of_squares(response) - constrained).max(0.0);
    (constrained, residual)
}

fn pseudo_f(constrained: f64, residual: f64, df_model: usize, df_residual: usize) -> f64 {
    (constrained / df_model as f64) / (residual / df_residual as f64)
}

impl<B: BackendEigh + BackendSVD + Sync> SignificanceTest for PermutationTest<B> {
    fn test(
        &self,
        response: &Array2<f64>,
        predictors: &Array2<f64>,
        conditioning: Option<&Array2<f64>>,
    ) -> Result<PermutationOutcome> {
        if self.config.iterations == 0 {
            return Err(AnalysisError::InvalidParameter(
                "permutation test needs at least one iteration".to_string(),
            ));
        }
        let model = self.rda.prepare(response, predictors, conditioning)?;
        let n = model.n_samples;
        let df_model = model.rank();
        let q = model.conditioning_rank();
        if df_model == 0 {
            return Err(AnalysisError::InvalidParameter(
                "model has no constrained axes to test".to_string(),
            ));
        }
        if n <= df_model + q + 1 {
            return Err(AnalysisError::InsufficientDegreesOfFreedom {
                n_samples: n,
                rank: df_model + q,
            });
        }
        let df_residual = n - df_model - q - 1;

        let (constrained, residual) = split_sum_of_squares(&model, &model.response);
        let statistic = pseudo_f(constrained, residual, df_model, df_residual);
        let tolerance = 1e-8 * statistic.abs().max(1.0);
        debug!(
            "Observed pseudo-F {:.6} on ({}, {}) df; running {} permutations.",
            statistic, df_model, df_residual, self.config.iterations
        );

        let seed = self.config.seed;
        let hits: usize = (0..self.config.iterations)
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
                let mut order: Vec<usize> = (0..n).collect();
                order.shuffle(&mut rng);
                let mut permuted = model.response.select(Axis(0), &order);
                if let Some(z_basis) = model.conditioning_basis.as_ref() {
                    permuted = &permuted - &project(z_basis, &permuted);
                }
                let (c, r) = split_sum_of_squares(&model, &permuted);
                let f_perm = pseudo_f(c, r, df_model, df_residual);
                usize::from(f_perm >= statistic - tolerance)
            })
            .sum();

        let p_value = (hits + 1) as f64 / (self.config.iterations + 1) as f64;
        info!(
            "Permutation test: F = {:.4}, p = {:.4} ({} permutations).",
            statistic, p_value, self.config.iterations
        );
        Ok(PermutationOutcome {
            statistic,
            p_value,
            permutations: self.config.iterations,
            df_model,
            df_residual,
        })
    }
}
