// src/io.rs
//! Reading and writing labeled matrices as delimited text.
//!
//! The first header cell names the label column and is otherwise ignored;
//! the remaining header cells are variable names. Every data row starts with
//! its sample-unit label. Empty fields and configured missing markers become
//! missing cells, never zeros.

use crate::error::{AnalysisError, Result};
use crate::matrix::LabeledMatrix;
use log::info;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// How a delimited file is parsed and written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub delimiter: u8,
    /// Field contents (after trimming) that mean "missing". The first marker is
    /// used when writing missing cells.
    pub missing_markers: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            delimiter: b',',
            missing_markers: vec!["NA".to_string(), "NaN".to_string(), ".".to_string()],
        }
    }
}

impl LoaderConfig {
    /// Tab-separated variant of the default configuration.
    pub fn tsv() -> Self {
        LoaderConfig {
            delimiter: b'\t',
            ..Self::default()
        }
    }

    fn is_missing(&self, field: &str) -> bool {
        field.is_empty() || self.missing_markers.iter().any(|m| m == field)
    }
}

/// Reads a labeled matrix from a delimited text file.
pub fn read_matrix<P: AsRef<Path>>(path: P, config: &LoaderConfig) -> Result<LabeledMatrix> {
    let file = File::open(path.as_ref())?;
    let matrix = read_matrix_from_reader(file, config)?;
    info!(
        "Loaded {} sample units x {} variables ({} missing cells) from {:?}.",
        matrix.nrows(),
        matrix.ncols(),
        matrix.missing_count(),
        path.as_ref()
    );
    Ok(matrix)
}

/// Reads a labeled matrix from any reader.
pub fn read_matrix_from_reader<R: Read>(reader: R, config: &LoaderConfig) -> Result<LabeledMatrix> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    if headers.is_empty() {
        return Err(AnalysisError::InvalidParameter(
            "input has no header row".to_string(),
        ));
    }
    let col_labels: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    let n_cols = col_labels.len();

    let mut row_labels = Vec::new();
    let mut cells = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let mut fields = record.iter();
        let label = fields.next().unwrap_or_default().to_string();
        for (field, column) in fields.zip(&col_labels) {
            let value = if config.is_missing(field) {
                f64::NAN
            } else {
                field.parse::<f64>().map_err(|_| AnalysisError::Parse {
                    row: label.clone(),
                    column: column.clone(),
                    value: field.to_string(),
                })?
            };
            cells.push(value);
        }
        row_labels.push(label);
    }

    let values = Array2::from_shape_vec((row_labels.len(), n_cols), cells).map_err(|e| {
        AnalysisError::InvalidParameter(format!("cannot shape parsed cells into a matrix: {}", e))
    })?;
    LabeledMatrix::new(row_labels, col_labels, values)
}

/// Writes a labeled matrix in the format `read_matrix` accepts.
pub fn write_matrix<W: Write>(writer: W, matrix: &LabeledMatrix, config: &LoaderConfig) -> Result<()> {
    let missing = config.missing_markers.first().map(String::as_str).unwrap_or("");
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(config.delimiter)
        .from_writer(writer);

    let mut header = Vec::with_capacity(matrix.ncols() + 1);
    header.push(String::new());
    header.extend(matrix.col_labels().iter().cloned());
    csv_writer.write_record(&header)?;

    for (label, row) in matrix.row_labels().iter().zip(matrix.values().rows()) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(label.clone());
        record.extend(row.iter().map(|v| if v.is_nan() { missing.to_string() } else { v.to_string() }));
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes a labeled matrix to a file.
pub fn write_matrix_to_path<P: AsRef<Path>>(path: P, matrix: &LabeledMatrix, config: &LoaderConfig) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_matrix(file, matrix, config)
}
