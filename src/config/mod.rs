use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::commit::PersistencePolicy;
use crate::error::AppError;
use crate::resilient::RetryPolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub sheets: SheetsConfig,
    pub tables: TableConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub retry: RetryConfig,
    pub persistence: PersistenceConfig,
}

/// Spreadsheet service connection configuration
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Bearer token minted from the service-account bundle by the host.
    pub access_token: String,
    pub sheets_base_url: String,
    pub drive_base_url: String,
}

/// Names of the spreadsheet and its three worksheets
#[derive(Debug, Clone)]
pub struct TableConfig {
    pub spreadsheet: String,
    pub examples: String,
    pub assignments: String,
    pub results: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
}

/// Retry policies for each class of store call
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub open_spreadsheet: RetryPolicy,
    pub open_worksheet: RetryPolicy,
    pub read: RetryPolicy,
    pub append: RetryPolicy,
}

/// How answers reach the results table
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub policy: PersistencePolicy,
    /// Append a per-answer UUID column usable as an idempotency key downstream.
    pub include_answer_id: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let sheets = SheetsConfig {
            access_token: env::var("SHEETS_ACCESS_TOKEN").map_err(|_| AppError::Config {
                message: "SHEETS_ACCESS_TOKEN is required".to_string(),
            })?,
            sheets_base_url: env::var("SHEETS_BASE_URL")
                .unwrap_or_else(|_| "https://sheets.googleapis.com".to_string()),
            drive_base_url: env::var("DRIVE_BASE_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com".to_string()),
        };

        let defaults = TableConfig::default();
        let tables = TableConfig {
            spreadsheet: env::var("SPREADSHEET_NAME").unwrap_or(defaults.spreadsheet),
            examples: env::var("EXAMPLES_WORKSHEET").unwrap_or(defaults.examples),
            assignments: env::var("ASSIGNMENTS_WORKSHEET").unwrap_or(defaults.assignments),
            results: env::var("RESULTS_WORKSHEET").unwrap_or(defaults.results),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", 30000),
        };

        let retry = RetryConfig::from_env();

        let policy = match env::var("PERSISTENCE_POLICY") {
            Ok(raw) => PersistencePolicy::from_str(&raw)
                .map_err(|message| AppError::Config { message })?,
            Err(_) => PersistencePolicy::default(),
        };
        let persistence = PersistenceConfig {
            policy,
            include_answer_id: env_or("RESULTS_INCLUDE_ANSWER_ID", false),
        };

        Ok(Config {
            sheets,
            tables,
            logging,
            request,
            retry,
            persistence,
        })
    }
}

impl RetryConfig {
    fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            open_spreadsheet: RetryPolicy::fixed(
                env_or("SPREADSHEET_OPEN_MAX_ATTEMPTS", defaults.open_spreadsheet.max_attempts),
                env_ms("SPREADSHEET_OPEN_DELAY_MS", defaults.open_spreadsheet.initial_delay),
            ),
            open_worksheet: RetryPolicy::exponential(
                env_or("WORKSHEET_OPEN_MAX_ATTEMPTS", defaults.open_worksheet.max_attempts),
                env_ms("WORKSHEET_OPEN_DELAY_MS", defaults.open_worksheet.initial_delay),
                env_or("WORKSHEET_OPEN_BACKOFF", defaults.open_worksheet.multiplier),
            ),
            read: RetryPolicy::fixed(
                env_or("READ_MAX_ATTEMPTS", defaults.read.max_attempts),
                env_ms("READ_DELAY_MS", defaults.read.initial_delay),
            ),
            append: RetryPolicy::fixed(
                env_or("APPEND_MAX_ATTEMPTS", defaults.append.max_attempts),
                env_ms("APPEND_DELAY_MS", defaults.append.initial_delay),
            ),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_ms(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_or(key, default.as_millis() as u64))
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            spreadsheet: "User Study Ranked Examples".to_string(),
            examples: "examples".to_string(),
            assignments: "assignments".to_string(),
            results: "results".to_string(),
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 30000 }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let second = Duration::from_secs(1);
        Self {
            open_spreadsheet: RetryPolicy::fixed(3, second),
            open_worksheet: RetryPolicy::exponential(5, second, 2.0),
            read: RetryPolicy::fixed(3, second),
            append: RetryPolicy::fixed(3, second),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            policy: PersistencePolicy::default(),
            include_answer_id: false,
        }
    }
}
