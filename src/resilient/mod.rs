//! Retrying access to the remote tabular store.
//!
//! Every store call made by the annotation flow goes through
//! [`ResilientStore`]. Transient failures are retried here, sleeping
//! between attempts; anything that survives the policy becomes a fatal
//! [`StoreError::Exhausted`]. Non-transient failures (authorization, missing
//! sheets) are returned on the first attempt.
//!
//! A retried append is not de-duplicated: if the store applied a write but
//! the success signal was lost, the retry writes the rows again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{RetryConfig, TableConfig};
use crate::error::{StoreError, StoreResult};
use crate::store::{Record, Row, SpreadsheetHandle, TabularStore, WorksheetHandle};

/// Attempt budget and delay schedule for one class of call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Factor applied to the delay after each further failure.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Same delay between every attempt.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::exponential(max_attempts, delay, 1.0)
    }

    /// Delay grows by `multiplier` after each failure.
    pub fn exponential(max_attempts: u32, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
        }
    }

    /// Delay to wait after the `failed_attempt`-th attempt (1-based) failed.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1) as i32;
        self.initial_delay.mul_f64(self.multiplier.max(0.0).powi(exponent))
    }
}

/// Run `operation` until it succeeds, fails non-transiently, or the policy's
/// attempts are used up.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation = %operation, attempt, "Store call recovered after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_transient() => {
                error!(operation = %operation, attempt, error = %e, "Store call failed permanently");
                return Err(e);
            }
            Err(e) if attempt >= max_attempts => {
                error!(
                    operation = %operation,
                    attempts = attempt,
                    error = %e,
                    "Store call retries exhausted"
                );
                return Err(StoreError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation = %operation,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "Retrying store call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// The spreadsheet and the three worksheets the tool works against.
#[derive(Debug, Clone)]
pub struct Workbook {
    pub spreadsheet: SpreadsheetHandle,
    pub examples: WorksheetHandle,
    pub assignments: WorksheetHandle,
    pub results: WorksheetHandle,
}

/// Store wrapper applying a [`RetryPolicy`] per call class.
#[derive(Clone)]
pub struct ResilientStore {
    inner: Arc<dyn TabularStore>,
    policies: RetryConfig,
}

impl ResilientStore {
    /// Wrap a store with the given policies
    pub fn new(inner: Arc<dyn TabularStore>, policies: RetryConfig) -> Self {
        Self { inner, policies }
    }

    pub async fn open_spreadsheet(&self, name: &str) -> StoreResult<SpreadsheetHandle> {
        let inner = self.inner.as_ref();
        retry_with_backoff(&self.policies.open_spreadsheet, "open_spreadsheet", move || {
            inner.open_spreadsheet(name)
        })
        .await
    }

    pub async fn open_worksheet(
        &self,
        spreadsheet: &SpreadsheetHandle,
        name: &str,
    ) -> StoreResult<WorksheetHandle> {
        let inner = self.inner.as_ref();
        retry_with_backoff(&self.policies.open_worksheet, "open_worksheet", move || {
            inner.open_worksheet(spreadsheet, name)
        })
        .await
    }

    pub async fn get_all_records(&self, sheet: &WorksheetHandle) -> StoreResult<Vec<Record>> {
        let inner = self.inner.as_ref();
        retry_with_backoff(&self.policies.read, "get_all_records", move || {
            inner.get_all_records(sheet)
        })
        .await
    }

    pub async fn append_row(&self, sheet: &WorksheetHandle, row: Row) -> StoreResult<()> {
        let inner = self.inner.as_ref();
        retry_with_backoff(&self.policies.append, "append_row", move || {
            inner.append_row(sheet, row.clone())
        })
        .await
    }

    pub async fn append_rows(&self, sheet: &WorksheetHandle, rows: Vec<Row>) -> StoreResult<()> {
        let inner = self.inner.as_ref();
        retry_with_backoff(&self.policies.append, "append_rows", move || {
            inner.append_rows(sheet, rows.clone())
        })
        .await
    }

    /// Open the spreadsheet and its examples, assignments and results sheets.
    pub async fn open_workbook(&self, tables: &TableConfig) -> StoreResult<Workbook> {
        let spreadsheet = self.open_spreadsheet(&tables.spreadsheet).await?;
        let examples = self.open_worksheet(&spreadsheet, &tables.examples).await?;
        let assignments = self.open_worksheet(&spreadsheet, &tables.assignments).await?;
        let results = self.open_worksheet(&spreadsheet, &tables.results).await?;

        info!(spreadsheet = %spreadsheet.title, "Workbook opened");

        Ok(Workbook {
            spreadsheet,
            examples,
            assignments,
            results,
        })
    }
}
