//! # Evidence Annotator
//!
//! An MCP server that runs a claim-verification user study. Participants log
//! in with a user id, read a claim, reveal evidence sentences one at a time
//! and judge whether the evidence supports or refutes the claim. Examples
//! and per-user assignments are read from a remote spreadsheet and answers
//! are appended to a results worksheet.
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (Rust) → ResilientStore (retry + backoff)
//!                    ↓                      ↓
//!          SessionRegistry / Flow     Sheets & Drive REST
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use evidence_annotator::{AppState, Config, McpServer};
//! use evidence_annotator::store::SheetsClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let client = SheetsClient::new(&config.sheets, config.request.clone())?;
//!     let state = Arc::new(AppState::connect(config, Arc::new(client)).await?);
//!     McpServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

/// Read-through cache of the examples and assignments tables.
pub mod catalog;
/// Writing answers to the results table.
pub mod commit;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Session actions and the views they produce.
pub mod flow;
/// Retry with backoff around every store call.
pub mod resilient;
/// MCP server implementation and request handling.
pub mod server;
/// Per-participant session state.
pub mod session;
/// Remote tabular store clients.
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
