use crate::domain::model::{Cell, Table};
use crate::utils::error::{EtlError, Result};
use std::collections::HashSet;

/// Parses a headed CSV document. Empty fields become missing cells.
pub fn read_table(name: &str, data: &[u8]) -> Result<Table> {
    if data.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(EtlError::EmptyInput {
            path: name.to_string(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::None)
        .from_reader(data);

    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
        return Err(EtlError::EmptyInput {
            path: name.to_string(),
        });
    }

    let mut seen = HashSet::new();
    if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
        return Err(EtlError::ValidationError {
            message: format!("Duplicate column '{}' in {}", dup, name),
        });
    }

    let mut table = Table::new(name, columns);
    for record in reader.records() {
        let record = record?;
        let row: Vec<Cell> = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    None
                } else {
                    Some(field.to_string())
                }
            })
            .collect();
        table.push_row(row)?;
    }

    Ok(table)
}

pub fn write_table(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
    }
    writer.into_inner().map_err(|e| EtlError::ProcessingError {
        message: format!("Failed to flush CSV for {}: {}", table.name, e),
    })
}
