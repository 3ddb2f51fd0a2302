// Community data screening, transformation and RDA variance partitioning

#![doc = include_str!("../README.md")]

pub mod error;
pub mod io;
pub mod linalg_backends;
pub mod matrix;
pub mod partition;
pub mod permutation;
pub mod rda;
pub mod report;
pub mod screening;
pub mod standardize;
pub mod transform;


pub use error::{AnalysisError, Result};
pub use io::{read_matrix, read_matrix_from_reader, write_matrix, LoaderConfig};
pub use matrix::{LabeledMatrix, Margin};
pub use partition::{
    partition_variance, test_fraction, FractionId, ModelSpec, PredictorGroup, VarianceFraction,
    VarianceFractionSet,
};
pub use permutation::{PermutationConfig, PermutationOutcome, PermutationTest, SignificanceTest};
pub use rda::{adjusted_r_squared, Ordination, OrdinationResult, Rda, RdaConfig};
pub use screening::{filter_by_sufficiency, impute_missing, summarize, ColumnSummary, ImputeMethod};
