use std::fs;

use camino::Utf8Path;
use serde::Serialize;
use serde_json::Value;

use crate::error::BidsError;

/// A header row plus string cells, as read from electrode/channel tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.columns.iter().position(|column| column == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).map(String::as_str).unwrap_or_default())
                .collect(),
        )
    }

    /// One JSON object per row, keyed by column name.
    pub fn to_records(&self) -> Value {
        Value::Array(
            self.rows
                .iter()
                .map(|row| {
                    Value::Object(
                        self.columns
                            .iter()
                            .zip(row)
                            .map(|(column, cell)| (column.clone(), Value::String(cell.clone())))
                            .collect(),
                    )
                })
                .collect(),
        )
    }
}

pub trait TableReader: Send + Sync {
    fn read_table(&self, path: &Utf8Path) -> Result<Table, BidsError>;
}

/// Tab-separated tables with a header line (BIDS `*.tsv`).
#[derive(Debug, Default, Clone, Copy)]
pub struct TsvReader;

impl TsvReader {
    pub fn parse(path: &Utf8Path, content: &str) -> Result<Table, BidsError> {
        let table_error = |message: String| BidsError::Table {
            path: path.to_path_buf(),
            message,
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let columns: Vec<String> = reader
            .headers()
            .map_err(|err| table_error(err.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        if columns.is_empty() {
            return Err(table_error("missing header line".to_string()));
        }
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| table_error(err.to_string()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Table { columns, rows })
    }
}

impl TableReader for TsvReader {
    fn read_table(&self, path: &Utf8Path) -> Result<Table, BidsError> {
        let content = fs::read_to_string(path.as_std_path()).map_err(|err| BidsError::Table {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::parse(path, &content)
    }
}
