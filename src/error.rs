// src/error.rs

use crate::matrix::Margin;
use thiserror::Error;

/// Every failure the crate can report.
///
/// All variants are local and deterministic: retrying with the same input
/// yields the same error. Variants carry the failing row, column or fraction
/// so the caller can point at the offending cell.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Column '{column}' has no present values; its mean and median are undefined.")]
    EmptyColumn { column: String },

    #[error("Cell (row '{row}', column '{column}') is missing; impute or filter before transforming.")]
    MissingValue { row: String, column: String },

    #[error("{operation}: value {value} at (row '{row}', column '{column}') is outside the domain of the function.")]
    Domain {
        operation: &'static str,
        row: String,
        column: String,
        value: f64,
    },

    #[error("{operation}: the {margin} aggregate for '{label}' is zero, cannot divide.")]
    DegenerateAxis {
        operation: &'static str,
        margin: Margin,
        label: String,
    },

    #[error("Variance fractions sum to {sum}, expected 1 within tolerance {tolerance}.")]
    PartitionInvariant { sum: f64, tolerance: f64 },

    #[error("Fraction '{fraction}' is obtained only by subtraction and cannot be tested.")]
    NotTestable { fraction: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{context}: expected {expected}, found {found}.")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Label '{0}' occurs more than once on the same axis.")]
    DuplicateLabel(String),

    #[error("Column '{0}' does not exist in the matrix.")]
    UnknownColumn(String),

    #[error("Model with {n_samples} samples and rank {rank} leaves no residual degrees of freedom.")]
    InsufficientDegreesOfFreedom { n_samples: usize, rank: usize },

    #[error("Linear algebra backend failed: {0}")]
    Linalg(String),

    #[error("Could not parse '{value}' at (row '{row}', column '{column}') as a number.")]
    Parse {
        row: String,
        column: String,
        value: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delimited text error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
