//! Remote tabular store access.
//!
//! The [`TabularStore`] trait is the seam between the annotation logic and
//! the spreadsheet service. Implementations make exactly one attempt per
//! call; retrying is the job of [`crate::resilient::ResilientStore`].

mod client;
mod memory;
mod types;

pub use client::SheetsClient;
pub use memory::{MemoryStore, StoreOp};
pub use types::*;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreResult;

/// One table row keyed by header name.
pub type Record = serde_json::Map<String, Value>;

/// One row of cells in column order, as written by an append.
pub type Row = Vec<Value>;

/// Opened spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetHandle {
    /// Service-side spreadsheet identifier.
    pub id: String,
    /// Spreadsheet title it was opened by.
    pub title: String,
}

/// Opened worksheet inside a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorksheetHandle {
    /// Owning spreadsheet identifier.
    pub spreadsheet_id: String,
    /// Service-side sheet identifier.
    pub sheet_id: i64,
    /// Worksheet title, also used as the A1 range.
    pub title: String,
}

/// Operations the annotation tool needs from a spreadsheet-like store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Open a spreadsheet by its exact title.
    async fn open_spreadsheet(&self, name: &str) -> StoreResult<SpreadsheetHandle>;

    /// Open a worksheet of an already opened spreadsheet by title.
    async fn open_worksheet(
        &self,
        spreadsheet: &SpreadsheetHandle,
        name: &str,
    ) -> StoreResult<WorksheetHandle>;

    /// Read every data row, keyed by the header row.
    async fn get_all_records(&self, sheet: &WorksheetHandle) -> StoreResult<Vec<Record>>;

    /// Append a single row after the last data row.
    async fn append_row(&self, sheet: &WorksheetHandle, row: Row) -> StoreResult<()>;

    /// Append several rows in one call; the store receives all of them or none.
    async fn append_rows(&self, sheet: &WorksheetHandle, rows: Vec<Row>) -> StoreResult<()>;
}

/// Turn a raw value grid (header row first) into records.
///
/// Short rows are padded with empty strings so every record carries every
/// header key.
pub fn records_from_grid(grid: Vec<Vec<Value>>) -> Vec<Record> {
    let mut rows = grid.into_iter();
    let header: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(cell_to_string).collect(),
        None => return Vec::new(),
    };

    rows.map(|row| {
        let mut record = Record::new();
        for (index, key) in header.iter().enumerate() {
            let cell = row
                .get(index)
                .cloned()
                .unwrap_or_else(|| Value::String(String::new()));
            record.insert(key.clone(), cell);
        }
        record
    })
    .collect()
}

/// Render a cell the way it reads in the sheet.
pub fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            // Integral floats such as 101.0 come back from unformatted reads
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
