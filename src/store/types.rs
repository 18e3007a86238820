use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MIME type Drive reports for native spreadsheets
pub const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

/// Drive `files.list` response
#[derive(Debug, Clone, Deserialize)]
pub struct DriveFileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
}

/// Drive file entry
#[derive(Debug, Clone, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
}

/// Sheets `spreadsheets.get` response restricted to sheet properties
#[derive(Debug, Clone, Deserialize)]
pub struct SpreadsheetMetadata {
    #[serde(default)]
    pub sheets: Vec<SheetEntry>,
}

/// Single sheet inside [`SpreadsheetMetadata`]
#[derive(Debug, Clone, Deserialize)]
pub struct SheetEntry {
    pub properties: SheetProperties,
}

/// Sheet properties
#[derive(Debug, Clone, Deserialize)]
pub struct SheetProperties {
    #[serde(rename = "sheetId")]
    pub sheet_id: i64,
    pub title: String,
}

/// Sheets `values.get` response and `values.append` request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(rename = "majorDimension", skip_serializing_if = "Option::is_none")]
    pub major_dimension: Option<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

/// Sheets `values.append` response
#[derive(Debug, Clone, Deserialize)]
pub struct AppendValuesResponse {
    #[serde(rename = "spreadsheetId")]
    pub spreadsheet_id: Option<String>,
    pub updates: Option<UpdateValuesResponse>,
}

/// Summary of rows written by an append
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateValuesResponse {
    #[serde(rename = "updatedRange")]
    pub updated_range: Option<String>,
    #[serde(rename = "updatedRows")]
    pub updated_rows: Option<u32>,
}

impl ValueRange {
    /// Row-major body for an append
    pub fn rows(values: Vec<Vec<Value>>) -> Self {
        Self {
            range: None,
            major_dimension: Some("ROWS".to_string()),
            values,
        }
    }
}

/// Quote a worksheet title as an A1 range covering the whole sheet.
pub fn a1_range(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// Build the Drive query that finds a spreadsheet by exact title.
pub fn spreadsheet_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escaped, SPREADSHEET_MIME_TYPE
    )
}
