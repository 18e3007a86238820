use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Remote tabular store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Transient failure during {operation}: {message}")]
    Transient {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Not authorized: {status} - {message}")]
    Unauthorized { status: u16, message: String },

    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    #[error("{operation} failed after {attempts} attempts: {message}")]
    Exhausted {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StoreError {
    /// Whether another attempt of the same call may succeed.
    ///
    /// Rate limits, server-side failures, timeouts and connection problems are
    /// transient. Authorization failures and every other API error are not.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient { .. } | StoreError::Timeout { .. } => true,
            StoreError::Api { status, .. } => *status == 429 || *status >= 500,
            StoreError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            StoreError::Unauthorized { .. }
            | StoreError::NotFound { .. }
            | StoreError::Exhausted { .. }
            | StoreError::InvalidResponse { .. }
            | StoreError::InvalidUrl { .. } => false,
        }
    }

    /// Build the error for an unsuccessful HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => StoreError::Unauthorized { status, message },
            _ => StoreError::Api { status, message },
        }
    }
}

/// Annotation session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No user id has been entered")]
    NotLoggedIn,

    #[error("User not found: {user_id}")]
    UserNotFound { user_id: String },

    #[error("Malformed assignment for {user_id}: {reason} (raw: {raw:?})")]
    MalformedAssignment {
        user_id: String,
        raw: String,
        reason: String,
    },

    #[error("Malformed example row: {reason}")]
    MalformedExample { reason: String },

    #[error("Example not found: {example_id}")]
    ExampleNotFound { example_id: i64 },

    #[error("Session is not in progress (phase: {phase})")]
    NotInProgress { phase: String },

    #[error("Unknown session: {session_id}")]
    UnknownSession { session_id: String },

    #[error("{count} answer(s) not saved yet; commit before switching users")]
    UncommittedAnswers { count: usize },
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
