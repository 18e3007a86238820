use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{records_from_grid, Record, Row, SpreadsheetHandle, TabularStore, WorksheetHandle};
use crate::error::{StoreError, StoreResult};

/// Class of store call, used to inject failures and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    OpenSpreadsheet,
    OpenWorksheet,
    Read,
    Append,
}

impl StoreOp {
    fn name(self) -> &'static str {
        match self {
            StoreOp::OpenSpreadsheet => "open_spreadsheet",
            StoreOp::OpenWorksheet => "open_worksheet",
            StoreOp::Read => "get_all_records",
            StoreOp::Append => "append",
        }
    }
}

/// In-process spreadsheet with one named spreadsheet and any number of
/// worksheets. Each worksheet keeps its header as the first grid row.
///
/// Transient failures can be queued per [`StoreOp`]; a failing append
/// writes nothing.
#[derive(Debug)]
pub struct MemoryStore {
    spreadsheet: String,
    sheets: Mutex<BTreeMap<String, Vec<Row>>>,
    pending_failures: Mutex<HashMap<StoreOp, u32>>,
    calls: Mutex<HashMap<StoreOp, u32>>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    /// Create an empty store holding a single spreadsheet.
    pub fn new(spreadsheet: impl Into<String>) -> Self {
        Self {
            spreadsheet: spreadsheet.into(),
            sheets: Mutex::new(BTreeMap::new()),
            pending_failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Add a worksheet with the given header and data rows.
    pub fn with_table(self, name: &str, header: &[&str], rows: Vec<Row>) -> Self {
        let mut grid: Vec<Row> = vec![header.iter().map(|h| Value::from(*h)).collect()];
        grid.extend(rows);
        locked(&self.sheets).insert(name.to_string(), grid);
        self
    }

    /// Make the next `times` calls of `op` fail with a transient error.
    pub fn fail_next(&self, op: StoreOp, times: u32) {
        *locked(&self.pending_failures).entry(op).or_insert(0) += times;
    }

    /// Data rows of a worksheet, header excluded.
    pub fn rows(&self, name: &str) -> Vec<Row> {
        locked(&self.sheets)
            .get(name)
            .map(|grid| grid.iter().skip(1).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of calls of `op` made so far, failed ones included.
    pub fn call_count(&self, op: StoreOp) -> u32 {
        locked(&self.calls).get(&op).copied().unwrap_or(0)
    }

    fn enter(&self, op: StoreOp) -> StoreResult<()> {
        *locked(&self.calls).entry(op).or_insert(0) += 1;

        let mut failures = locked(&self.pending_failures);
        match failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(StoreError::Transient {
                    operation: op.name().to_string(),
                    status: Some(503),
                    message: "injected failure".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn append(&self, sheet: &WorksheetHandle, rows: Vec<Row>) -> StoreResult<()> {
        self.enter(StoreOp::Append)?;
        let mut sheets = locked(&self.sheets);
        let grid = sheets
            .get_mut(&sheet.title)
            .ok_or_else(|| StoreError::NotFound {
                kind: "worksheet".to_string(),
                name: sheet.title.clone(),
            })?;
        grid.extend(rows);
        Ok(())
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn open_spreadsheet(&self, name: &str) -> StoreResult<SpreadsheetHandle> {
        self.enter(StoreOp::OpenSpreadsheet)?;
        if name != self.spreadsheet {
            return Err(StoreError::NotFound {
                kind: "spreadsheet".to_string(),
                name: name.to_string(),
            });
        }
        Ok(SpreadsheetHandle {
            id: format!("mem-{}", self.spreadsheet),
            title: self.spreadsheet.clone(),
        })
    }

    async fn open_worksheet(
        &self,
        spreadsheet: &SpreadsheetHandle,
        name: &str,
    ) -> StoreResult<WorksheetHandle> {
        self.enter(StoreOp::OpenWorksheet)?;
        let sheets = locked(&self.sheets);
        let position = sheets
            .keys()
            .position(|k| k == name)
            .ok_or_else(|| StoreError::NotFound {
                kind: "worksheet".to_string(),
                name: name.to_string(),
            })?;
        Ok(WorksheetHandle {
            spreadsheet_id: spreadsheet.id.clone(),
            sheet_id: position as i64,
            title: name.to_string(),
        })
    }

    async fn get_all_records(&self, sheet: &WorksheetHandle) -> StoreResult<Vec<Record>> {
        self.enter(StoreOp::Read)?;
        let grid = locked(&self.sheets)
            .get(&sheet.title)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "worksheet".to_string(),
                name: sheet.title.clone(),
            })?;
        Ok(records_from_grid(grid))
    }

    async fn append_row(&self, sheet: &WorksheetHandle, row: Row) -> StoreResult<()> {
        self.append(sheet, vec![row])
    }

    async fn append_rows(&self, sheet: &WorksheetHandle, rows: Vec<Row>) -> StoreResult<()> {
        self.append(sheet, rows)
    }
}
