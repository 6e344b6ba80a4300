//! Data quality profiling of raw CSV files.
//!
//! A profile is computed per table and rendered into a plain-text report,
//! one section per file. Failures on a single file are written into the
//! report instead of aborting the run.

use crate::core::cleaning::parse_date;
use crate::domain::model::{Cell, Table};
use crate::utils::error::EtlError;
use std::collections::HashSet;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Empty,
    Integer,
    Float,
    Date,
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Empty => "empty",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
            ColumnType::Text => "text",
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; undefined below two values.
    pub std: Option<f64>,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

impl NumericSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let std = (count > 1).then(|| {
            let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            var.sqrt()
        });

        Some(Self {
            count,
            mean,
            std,
            min: sorted[0],
            q25: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q75: quantile(&sorted, 0.75),
            max: sorted[count - 1],
        })
    }
}

/// Linear interpolation between closest ranks over sorted input.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[derive(Debug, Clone)]
pub struct ColumnProfile {
    pub name: String,
    pub column_type: ColumnType,
    pub missing: usize,
    pub numeric: Option<NumericSummary>,
}

#[derive(Debug, Clone)]
pub struct TableProfile {
    pub file: String,
    pub rows: usize,
    pub columns: Vec<ColumnProfile>,
    pub duplicate_rows: usize,
    pub sample: Table,
}

pub struct Profiler<'a> {
    null_tokens: HashSet<&'a str>,
    date_formats: &'a [String],
    sample_rows: usize,
}

impl<'a> Profiler<'a> {
    pub fn new(null_tokens: &'a [String], date_formats: &'a [String], sample_rows: usize) -> Self {
        Self {
            null_tokens: null_tokens.iter().map(String::as_str).collect(),
            date_formats,
            sample_rows,
        }
    }

    fn value<'c>(&self, cell: &'c Cell) -> Option<&'c str> {
        cell.as_deref()
            .map(str::trim)
            .filter(|v| !self.null_tokens.contains(*v))
    }

    pub fn profile(&self, file: &str, table: &Table) -> TableProfile {
        let columns = (0..table.columns.len())
            .map(|idx| self.profile_column(table, idx))
            .collect();

        let mut seen: HashSet<&[Cell]> = HashSet::with_capacity(table.len());
        let duplicate_rows = table
            .rows
            .iter()
            .filter(|row| !seen.insert(row.as_slice()))
            .count();

        let mut sample = Table::new(table.name.clone(), table.columns.clone());
        sample.rows = table.rows.iter().take(self.sample_rows).cloned().collect();

        TableProfile {
            file: file.to_string(),
            rows: table.len(),
            columns,
            duplicate_rows,
            sample,
        }
    }

    fn profile_column(&self, table: &Table, idx: usize) -> ColumnProfile {
        let present: Vec<&str> = table
            .rows
            .iter()
            .filter_map(|row| self.value(&row[idx]))
            .collect();
        let missing = table.len() - present.len();

        let column_type = self.infer_type(&present);
        let numeric = if column_type.is_numeric() {
            let values: Vec<f64> = present.iter().filter_map(|v| v.parse().ok()).collect();
            NumericSummary::from_values(&values)
        } else {
            None
        };

        ColumnProfile {
            name: table.columns[idx].clone(),
            column_type,
            missing,
            numeric,
        }
    }

    fn infer_type(&self, values: &[&str]) -> ColumnType {
        if values.is_empty() {
            ColumnType::Empty
        } else if values.iter().all(|v| v.parse::<i64>().is_ok()) {
            ColumnType::Integer
        } else if values
            .iter()
            .all(|v| v.parse::<f64>().is_ok_and(f64::is_finite))
        {
            ColumnType::Float
        } else if values
            .iter()
            .all(|v| parse_date(v, self.date_formats).is_some())
        {
            ColumnType::Date
        } else {
            ColumnType::Text
        }
    }
}

pub fn report_header(timestamp: &str) -> String {
    format!("[Data Profiling Report - {}]\n\n", timestamp)
}

pub fn report_footer() -> &'static str {
    "Profiling complete.\n"
}

pub fn render_error(file: &str, error: &EtlError) -> String {
    match error {
        EtlError::EmptyInput { .. } => format!("Empty File: {}\n{}\n\n", file, "-".repeat(100)),
        other => format!("Error reading {}: {}\n{}\n\n", file, other, "-".repeat(100)),
    }
}

pub fn render_profile(profile: &TableProfile) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_profile(&mut out, profile);
    out
}

fn write_profile(out: &mut String, profile: &TableProfile) -> std::fmt::Result {
    writeln!(out, "=== Profiling {} ===", profile.file)?;
    writeln!(out, "Rows: {}, Columns: {}", profile.rows, profile.columns.len())?;

    let width = profile
        .columns
        .iter()
        .map(|c| c.name.len())
        .max()
        .unwrap_or(0);

    writeln!(out, "Columns and types")?;
    for column in &profile.columns {
        writeln!(out, "{:<width$}  {}", column.name, column.column_type.as_str())?;
    }

    writeln!(out, "\nMissing Values per Column:")?;
    for column in &profile.columns {
        writeln!(out, "{:<width$}  {}", column.name, column.missing)?;
    }

    writeln!(out, "\nDuplicates: {}", profile.duplicate_rows)?;

    let numeric: Vec<_> = profile
        .columns
        .iter()
        .filter_map(|c| c.numeric.as_ref().map(|n| (c.name.as_str(), n)))
        .collect();
    if !numeric.is_empty() {
        writeln!(out, "\nNumeric Summary:")?;
        writeln!(
            out,
            "{:<width$}  {:>8} {:>14} {:>14} {:>14} {:>14} {:>14} {:>14} {:>14}",
            "", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
        )?;
        for (name, n) in numeric {
            let std = n
                .std
                .map(|s| format!("{:.4}", s))
                .unwrap_or_else(|| "NaN".to_string());
            writeln!(
                out,
                "{:<width$}  {:>8} {:>14.4} {:>14} {:>14.4} {:>14.4} {:>14.4} {:>14.4} {:>14.4}",
                name, n.count, n.mean, std, n.min, n.q25, n.median, n.q75, n.max
            )?;
        }
    }

    writeln!(out, "\nSample Data:")?;
    write_sample(out, &profile.sample)?;
    writeln!(out, "{}\n", "-".repeat(100))
}

fn write_sample(out: &mut String, sample: &Table) -> std::fmt::Result {
    let widths: Vec<usize> = sample
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            sample
                .rows
                .iter()
                .map(|r| r[i].as_deref().map_or(3, str::len))
                .chain(std::iter::once(name.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = sample
        .columns
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("{:>w$}", name, w = *w))
        .collect();
    writeln!(out, "{}", header.join(" "))?;

    for row in &sample.rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:>w$}", cell.as_deref().unwrap_or("NaN"), w = *w))
            .collect();
        writeln!(out, "{}", line.join(" "))?;
    }
    Ok(())
}
