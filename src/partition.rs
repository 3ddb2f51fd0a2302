// src/partition.rs
//! Variance partitioning of a response matrix among groups of explanatory
//! variables, using adjusted R² of RDA fits.
//!
//! With two groups A and B the classic fractions are
//!
//! ```text
//!   [a+b] = adjR²(Y ~ A)        [b+c] = adjR²(Y ~ B)      [a+b+c] = adjR²(Y ~ A + B)
//!   [b]   = [a+b] + [b+c] - [a+b+c]
//!   [a]   = [a+b] - [b]          [c] = [b+c] - [b]         [d] = 1 - [a+b+c]
//! ```
//!
//! `[a]`, `[c]` and every directly fitted model can be tested; `[b]` and `[d]`
//! exist only as differences and cannot.

use crate::error::{AnalysisError, Result};
use crate::matrix::LabeledMatrix;
use crate::permutation::{PermutationOutcome, SignificanceTest};
use crate::rda::{check_same_rows, Ordination};
use log::{debug, info};
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;

/// Absolute tolerance of the sum-to-one check, scaled by the magnitude of the terms.
pub const PARTITION_TOLERANCE: f64 = 1e-9;

/// A named set of explanatory variables measured on the same sample units as the response.
#[derive(Clone, Debug)]
pub struct PredictorGroup {
    pub name: String,
    pub matrix: LabeledMatrix,
}

impl PredictorGroup {
    pub fn new(name: impl Into<String>, matrix: LabeledMatrix) -> Self {
        Self { name: name.into(), matrix }
    }
}

/// Identifies one fraction of a partition. Group indices follow the order
/// in which groups were passed to [`partition_variance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum FractionId {
    /// Everything one group explains on its own.
    Group(usize),
    /// Everything all groups explain together.
    AllGroups,
    /// What one group explains after all other groups are partialled out.
    Unique(usize),
    /// Explained variance shared between groups.
    Shared,
    /// Unexplained variance.
    Residual,
}

impl FractionId {
    /// Whether a single model directly estimates this fraction.
    pub fn is_testable(self) -> bool {
        matches!(self, FractionId::Group(_) | FractionId::AllGroups | FractionId::Unique(_))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VarianceFraction {
    pub id: FractionId,
    pub label: String,
    /// Adjusted R² of the fraction; may be negative.
    pub adj_r_squared: f64,
    pub testable: bool,
}

/// Predictor and conditioning groups of the model that estimates a testable fraction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub predictors: Vec<usize>,
    pub conditioning: Vec<usize>,
}

/// The fractions of one partition, in reporting order.
#[derive(Clone, Debug, Serialize)]
pub struct VarianceFractionSet {
    group_names: Vec<String>,
    fractions: Vec<VarianceFraction>,
    n_samples: usize,
}

impl VarianceFractionSet {
    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &VarianceFraction> {
        self.fractions.iter()
    }

    pub fn get(&self, id: FractionId) -> Option<&VarianceFraction> {
        self.fractions.iter().find(|f| f.id == id)
    }

    pub fn value(&self, id: FractionId) -> Option<f64> {
        self.get(id).map(|f| f.adj_r_squared)
    }

    /// Human-readable name of a fraction, e.g. `unique-to-env`.
    pub fn label(&self, id: FractionId) -> String {
        fraction_label(&self.group_names, id)
    }

    /// The model whose fit estimates `id` directly.
    ///
    /// # Errors
    /// `NotTestable` for fractions obtained only by subtraction.
    pub fn model_spec(&self, id: FractionId) -> Result<ModelSpec> {
        let n_groups = self.group_names.len();
        match id {
            FractionId::Group(i) if i < n_groups => Ok(ModelSpec { predictors: vec![i], conditioning: vec![] }),
            FractionId::AllGroups => Ok(ModelSpec { predictors: (0..n_groups).collect(), conditioning: vec![] }),
            FractionId::Unique(i) if i < n_groups => Ok(ModelSpec {
                predictors: vec![i],
                conditioning: (0..n_groups).filter(|&k| k != i).collect(),
            }),
            FractionId::Group(i) | FractionId::Unique(i) => Err(AnalysisError::InvalidParameter(format!(
                "group index {} out of range for {} groups",
                i, n_groups
            ))),
            FractionId::Shared | FractionId::Residual => Err(AnalysisError::NotTestable {
                fraction: self.label(id),
            }),
        }
    }
}

fn fraction_label(group_names: &[String], id: FractionId) -> String {
    match id {
        FractionId::Group(i) => group_names.get(i).cloned().unwrap_or_else(|| format!("group{}", i)),
        FractionId::AllGroups => "all".to_string(),
        FractionId::Unique(i) => format!("unique-to-{}", fraction_label(group_names, FractionId::Group(i))),
        FractionId::Shared => format!("shared-{}", group_names.join("-")),
        FractionId::Residual => "residual".to_string(),
    }
}

/// Concatenates the columns of the selected groups.
fn stack_groups(groups: &[PredictorGroup], indices: &[usize]) -> Result<Array2<f64>> {
    let views: Vec<ArrayView2<'_, f64>> = indices.iter().map(|&i| groups[i].matrix.view()).collect();
    ndarray::concatenate(Axis(1), &views)
        .map_err(|e| AnalysisError::InvalidParameter(format!("cannot stack predictor groups: {}", e)))
}

fn validate_groups(species: &LabeledMatrix, groups: &[PredictorGroup]) -> Result<()> {
    if groups.len() < 2 {
        return Err(AnalysisError::InvalidParameter(format!(
            "variance partitioning needs at least 2 predictor groups, got {}",
            groups.len()
        )));
    }
    let mut names = HashSet::with_capacity(groups.len());
    for group in groups {
        if !names.insert(group.name.as_str()) {
            return Err(AnalysisError::DuplicateLabel(group.name.clone()));
        }
        if group.matrix.ncols() == 0 {
            return Err(AnalysisError::InvalidParameter(format!(
                "predictor group '{}' has no columns",
                group.name
            )));
        }
        check_same_rows(species, &group.matrix)?;
    }
    Ok(())
}

/// Partitions the variation of `species` among `groups`.
///
/// Two groups yield `[a+b]`, `[b+c]`, `[a+b+c]`, `[a]`, `[c]`, `[b]` and `[d]`.
/// With more groups, each group's unique fraction is `adjR²(all) - adjR²(all but that group)`
/// and everything else explained is reported as one combined `Shared` fraction.
/// Independent fits run in parallel; the result does not depend on their order.
///
/// # Errors
/// `PartitionInvariant` if the unique, shared and residual fractions do not sum to one.
pub fn partition_variance<O: Ordination>(
    ordination: &O,
    species: &LabeledMatrix,
    groups: &[PredictorGroup],
) -> Result<VarianceFractionSet> {
    validate_groups(species, groups)?;
    let n_groups = groups.len();
    let response = species.values();

    // Models: all groups, each group alone, and (for >2 groups) all but one group.
    let mut subsets: Vec<Vec<usize>> = Vec::with_capacity(2 * n_groups + 1);
    subsets.push((0..n_groups).collect());
    subsets.extend((0..n_groups).map(|i| vec![i]));
    if n_groups > 2 {
        subsets.extend((0..n_groups).map(|i| (0..n_groups).filter(|&k| k != i).collect()));
    }

    let fits: Vec<f64> = subsets
        .par_iter()
        .map(|subset| -> Result<f64> {
            let predictors = stack_groups(groups, subset)?;
            let result = ordination.fit(response, &predictors, None)?;
            debug!("adjR² of groups {:?}: {:.6}", subset, result.adj_r_squared);
            Ok(result.adj_r_squared)
        })
        .collect::<Result<Vec<f64>>>()?;

    let all = fits[0];
    let single = &fits[1..=n_groups];
    let (unique, shared): (Vec<f64>, f64) = if n_groups == 2 {
        let shared = single[0] + single[1] - all;
        (vec![single[0] - shared, single[1] - shared], shared)
    } else {
        let without = &fits[n_groups + 1..];
        let unique: Vec<f64> = without.iter().map(|w| all - w).collect();
        let shared = all - unique.iter().sum::<f64>();
        (unique, shared)
    };
    let residual = 1.0 - all;

    check_sums_to_one(&unique, shared, residual)?;

    let group_names: Vec<String> = groups.iter().map(|g| g.name.clone()).collect();
    let mut entries: Vec<(FractionId, f64)> = Vec::with_capacity(2 * n_groups + 3);
    entries.extend(single.iter().enumerate().map(|(i, &v)| (FractionId::Group(i), v)));
    entries.push((FractionId::AllGroups, all));
    entries.extend(unique.iter().enumerate().map(|(i, &v)| (FractionId::Unique(i), v)));
    entries.push((FractionId::Shared, shared));
    entries.push((FractionId::Residual, residual));

    let fractions = entries
        .into_iter()
        .map(|(id, adj_r_squared)| VarianceFraction {
            id,
            label: fraction_label(&group_names, id),
            adj_r_squared,
            testable: id.is_testable(),
        })
        .collect();

    info!(
        "Partitioned variation of {} species over {} sites among {} groups: explained {:.4}, residual {:.4}.",
        species.ncols(),
        species.nrows(),
        n_groups,
        all,
        residual
    );

    Ok(VarianceFractionSet {
        group_names,
        fractions,
        n_samples: species.nrows(),
    })
}

fn check_sums_to_one(unique: &[f64], shared: f64, residual: f64) -> Result<()> {
    let terms = unique.iter().copied().chain([shared, residual]);
    let (sum, magnitude) = terms.fold((0.0, 0.0), |(s, m), t| (s + t, m + t.abs()));
    let tolerance = PARTITION_TOLERANCE * magnitude.max(1.0);
    if !sum.is_finite() || (sum - 1.0).abs() > tolerance {
        return Err(AnalysisError::PartitionInvariant { sum, tolerance });
    }
    Ok(())
}

/// Runs a significance test on the model behind a testable fraction.
///
/// `groups` must be the groups the set was computed from, in the same order.
///
/// # Errors
/// `NotTestable` when `id` is the shared or residual fraction.
pub fn test_fraction<T: SignificanceTest>(
    tester: &T,
    species: &LabeledMatrix,
    groups: &[PredictorGroup],
    set: &VarianceFractionSet,
    id: FractionId,
) -> Result<PermutationOutcome> {
    let fraction = set.get(id).ok_or_else(|| {
        AnalysisError::InvalidParameter(format!("fraction {:?} is not part of this partition", id))
    })?;
    if !fraction.testable {
        return Err(AnalysisError::NotTestable { fraction: fraction.label.clone() });
    }
    let names_match = groups.len() == set.group_names.len()
        && groups.iter().zip(&set.group_names).all(|(g, n)| &g.name == n);
    if !names_match {
        return Err(AnalysisError::InvalidParameter(
            "predictor groups differ from those the partition was computed from".to_string(),
        ));
    }
    validate_groups(species, groups)?;

    let spec = set.model_spec(id)?;
    let predictors = stack_groups(groups, &spec.predictors)?;
    let conditioning = if spec.conditioning.is_empty() {
        None
    } else {
        Some(stack_groups(groups, &spec.conditioning)?)
    };
    info!("Testing fraction '{}'.", fraction.label);
    tester.test(species.values(), &predictors, conditioning.as_ref())
}
