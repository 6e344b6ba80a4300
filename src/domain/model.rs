use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};

/// A single field. `None` marks a missing value.
pub type Cell = Option<String>;

/// An in-memory CSV table with a header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| EtlError::missing_column(&self.name, column))
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(EtlError::ValidationError {
                message: format!(
                    "Row has {} cells but table '{}' has {} columns",
                    row.len(),
                    self.name,
                    self.columns.len()
                ),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Appends a column, or returns the index of the existing one.
    pub fn ensure_column(&mut self, column: &str) -> usize {
        if let Some(idx) = self.column_index(column) {
            return idx;
        }
        self.columns.push(column.to_string());
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    /// Projects the listed columns, in the listed order, into a new table.
    pub fn select(&self, name: &str, columns: &[String]) -> Result<Table> {
        let indices = columns
            .iter()
            .map(|c| self.require_column(c))
            .collect::<Result<Vec<_>>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(Table {
            name: name.to_string(),
            columns: columns.to_vec(),
            rows,
        })
    }
}

/// Counters collected while cleaning one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub table: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub values_trimmed: usize,
    pub nulls_standardized: usize,
    pub invalid_categories: usize,
    pub invalid_dates: usize,
    pub non_numeric_zeroed: usize,
    pub negatives_clipped: usize,
    pub missing_filled: usize,
    pub rows_missing_required: usize,
    pub duplicates_removed: usize,
}

/// Join statistics for one lookup applied to a fact table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupReport {
    pub dimension: String,
    pub on: String,
    pub take: String,
    /// Rows that already carried a value and were left untouched.
    pub kept: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub duplicate_keys: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelReport {
    pub fact: String,
    pub rows: usize,
    pub invalid_dates: usize,
    pub lookups: Vec<LookupReport>,
}

#[derive(Debug, Clone, Default)]
pub struct TransformResult {
    pub clean_tables: Vec<Table>,
    pub cleaning_reports: Vec<CleaningReport>,
    pub dimensions: Vec<Table>,
    pub facts: Vec<Table>,
    pub model_reports: Vec<ModelReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patients() -> Table {
        let mut table = Table::new(
            "patients",
            vec!["patient_id".to_string(), "gender".to_string(), "age".to_string()],
        );
        table
            .push_row(vec![Some("1".into()), Some("Male".into()), Some("30".into())])
            .unwrap();
        table
            .push_row(vec![Some("2".into()), None, Some("41".into())])
            .unwrap();
        table
    }

    #[test]
    fn test_select_reorders_columns() {
        let table = patients();
        let dim = table
            .select("dim", &["age".to_string(), "patient_id".to_string()])
            .unwrap();
        assert_eq!(dim.columns, vec!["age", "patient_id"]);
        assert_eq!(dim.rows[1], vec![Some("41".to_string()), Some("2".to_string())]);
    }

    #[test]
    fn test_select_unknown_column_fails() {
        let err = patients()
            .select("dim", &["city".to_string()])
            .unwrap_err();
        assert!(matches!(err, EtlError::MissingColumn { ref column, .. } if column == "city"));
    }

    #[test]
    fn test_push_row_rejects_wrong_width() {
        let mut table = patients();
        assert!(table.push_row(vec![Some("3".into())]).is_err());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_ensure_column_pads_rows() {
        let mut table = patients();
        let idx = table.ensure_column("city");
        assert_eq!(idx, 3);
        assert!(table.rows.iter().all(|r| r.len() == 4 && r[3].is_none()));
        assert_eq!(table.ensure_column("age"), 2);
    }

    #[test]
    fn test_get_missing_value() {
        let table = patients();
        assert_eq!(table.get(0, "gender"), Some("Male"));
        assert_eq!(table.get(1, "gender"), None);
        assert_eq!(table.get(5, "gender"), None);
    }
}
