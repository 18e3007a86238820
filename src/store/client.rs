use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::types::{
    a1_range, spreadsheet_query, AppendValuesResponse, DriveFileList, SpreadsheetMetadata,
    ValueRange,
};
use super::{records_from_grid, Record, Row, SpreadsheetHandle, TabularStore, WorksheetHandle};
use crate::config::{RequestConfig, SheetsConfig};
use crate::error::{StoreError, StoreResult};

/// Client for the Google Sheets v4 and Drive v3 REST APIs
#[derive(Clone)]
pub struct SheetsClient {
    client: Client,
    sheets_base_url: String,
    drive_base_url: String,
    access_token: String,
    request_config: RequestConfig,
}

impl SheetsClient {
    /// Create a new Sheets client
    pub fn new(config: &SheetsConfig, request_config: RequestConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(StoreError::Http)?;

        Ok(Self {
            client,
            sheets_base_url: config.sheets_base_url.trim_end_matches('/').to_string(),
            drive_base_url: config.drive_base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            request_config,
        })
    }

    /// Get the Sheets base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.sheets_base_url
    }

    /// Build an endpoint URL, percent-encoding each path segment
    fn endpoint(&self, base: &str, segments: &[&str]) -> StoreResult<Url> {
        let mut url = Url::parse(base).map_err(|e| StoreError::InvalidUrl {
            url: base.to_string(),
            message: e.to_string(),
        })?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl {
                url: base.to_string(),
                message: "URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn values_url(&self, sheet: &WorksheetHandle, suffix: &str) -> StoreResult<Url> {
        let range = format!("{}{}", a1_range(&sheet.title), suffix);
        self.endpoint(
            &self.sheets_base_url,
            &["v4", "spreadsheets", &sheet.spreadsheet_id, "values", &range],
        )
    }

    /// Execute a single request and decode its JSON body (internal)
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> StoreResult<T> {
        let start = Instant::now();

        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    StoreError::Http(e)
                }
            })?;

        let status = response.status();
        debug!(
            operation = %operation,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis(),
            "Store call returned"
        );

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(StoreError::from_status(status.as_u16(), error_body));
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse {
                message: format!("Failed to parse {} response: {}", operation, e),
            })
    }

    async fn append_values(&self, sheet: &WorksheetHandle, rows: Vec<Row>) -> StoreResult<()> {
        let url = self.values_url(sheet, ":append")?;
        let count = rows.len();

        let request = self
            .client
            .post(url)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&ValueRange::rows(rows));

        let response: AppendValuesResponse = self.execute("append", request).await?;

        info!(
            sheet = %sheet.title,
            rows = count,
            updated_rows = ?response.updates.as_ref().and_then(|u| u.updated_rows),
            "Rows appended"
        );
        Ok(())
    }
}

#[async_trait]
impl TabularStore for SheetsClient {
    async fn open_spreadsheet(&self, name: &str) -> StoreResult<SpreadsheetHandle> {
        let url = self.endpoint(&self.drive_base_url, &["drive", "v3", "files"])?;
        let query = spreadsheet_query(name);

        let request = self.client.get(url).query(&[
            ("q", query.as_str()),
            ("fields", "files(id,name)"),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);

        let listing: DriveFileList = self.execute("open_spreadsheet", request).await?;

        let file = listing
            .files
            .into_iter()
            .find(|f| f.name == name)
            .ok_or_else(|| StoreError::NotFound {
                kind: "spreadsheet".to_string(),
                name: name.to_string(),
            })?;

        info!(spreadsheet = %name, id = %file.id, "Spreadsheet opened");

        Ok(SpreadsheetHandle {
            id: file.id,
            title: file.name,
        })
    }

    async fn open_worksheet(
        &self,
        spreadsheet: &SpreadsheetHandle,
        name: &str,
    ) -> StoreResult<WorksheetHandle> {
        let url = self.endpoint(&self.sheets_base_url, &["v4", "spreadsheets", &spreadsheet.id])?;

        let request = self
            .client
            .get(url)
            .query(&[("fields", "sheets.properties")]);

        let metadata: SpreadsheetMetadata = self.execute("open_worksheet", request).await?;

        let properties = metadata
            .sheets
            .into_iter()
            .map(|s| s.properties)
            .find(|p| p.title == name)
            .ok_or_else(|| StoreError::NotFound {
                kind: "worksheet".to_string(),
                name: name.to_string(),
            })?;

        debug!(worksheet = %name, sheet_id = properties.sheet_id, "Worksheet opened");

        Ok(WorksheetHandle {
            spreadsheet_id: spreadsheet.id.clone(),
            sheet_id: properties.sheet_id,
            title: properties.title,
        })
    }

    async fn get_all_records(&self, sheet: &WorksheetHandle) -> StoreResult<Vec<Record>> {
        let url = self.values_url(sheet, "")?;

        let request = self.client.get(url).query(&[
            ("majorDimension", "ROWS"),
            ("valueRenderOption", "UNFORMATTED_VALUE"),
        ]);

        let range: ValueRange = self.execute("get_all_records", request).await?;
        let records = records_from_grid(range.values);

        debug!(sheet = %sheet.title, records = records.len(), "Worksheet read");
        Ok(records)
    }

    async fn append_row(&self, sheet: &WorksheetHandle, row: Row) -> StoreResult<()> {
        self.append_values(sheet, vec![row]).await
    }

    async fn append_rows(&self, sheet: &WorksheetHandle, rows: Vec<Row>) -> StoreResult<()> {
        self.append_values(sheet, rows).await
    }
}
