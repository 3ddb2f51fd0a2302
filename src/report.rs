// src/report.rs
//! Plain-text rendering of analysis results.

use crate::partition::{FractionId, VarianceFractionSet};
use crate::screening::ColumnSummary;
use std::fmt;

/// Conventional bracket code of a fraction in a two-group partition.
fn two_group_code(id: FractionId) -> &'static str {
    match id {
        FractionId::Group(0) => "[a+b]",
        FractionId::Group(_) => "[b+c]",
        FractionId::AllGroups => "[a+b+c]",
        FractionId::Unique(0) => "[a]",
        FractionId::Unique(_) => "[c]",
        FractionId::Shared => "[b]",
        FractionId::Residual => "[d]",
    }
}

/// A partition rendered as a table: one line per fraction with code, label,
/// adjusted R² and testability. Bracket codes are only shown for two-group partitions.
pub struct FractionTable<'a>(pub &'a VarianceFractionSet);

impl fmt::Display for FractionTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = self.0;
        let two_groups = set.group_names().len() == 2;
        let label_width = set.iter().map(|fr| fr.label.len()).max().unwrap_or(0).max("fraction".len());

        writeln!(
            f,
            "Variance partitioning of {} sample units among {} groups",
            set.n_samples(),
            set.group_names().len()
        )?;
        writeln!(f, "{:<8} {:<label_width$} {:>12} {:>9}", "code", "fraction", "adj_R2", "testable")?;
        for fraction in set.iter() {
            let code = if two_groups { two_group_code(fraction.id) } else { "" };
            writeln!(
                f,
                "{:<8} {:<label_width$} {:>12.6} {:>9}",
                code,
                fraction.label,
                fraction.adj_r_squared,
                if fraction.testable { "yes" } else { "no" }
            )?;
        }
        Ok(())
    }
}

/// Column summaries rendered as a table, one row per column.
pub struct SummaryTable<'a>(pub &'a [ColumnSummary]);

impl fmt::Display for SummaryTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summaries = self.0;
        let label_width = summaries.iter().map(|s| s.label.len()).max().unwrap_or(0).max("column".len());
        writeln!(
            f,
            "{:<label_width$} {:>12} {:>12} {:>12} {:>12} {:>12} {:>8}",
            "column", "mean", "median", "sd", "min", "max", "missing"
        )?;
        for s in summaries {
            writeln!(
                f,
                "{:<label_width$} {:>12.4} {:>12.4} {:>12.4} {:>12.4} {:>12.4} {:>8}",
                s.label, s.mean, s.median, s.std_dev, s.min, s.max, s.n_missing
            )?;
        }
        Ok(())
    }
}

pub fn format_fraction_table(set: &VarianceFractionSet) -> String {
    FractionTable(set).to_string()
}

pub fn format_column_summaries(summaries: &[ColumnSummary]) -> String {
    SummaryTable(summaries).to_string()
}
