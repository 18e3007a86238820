//! Server module for the annotation tool surface.
//!
//! This module provides:
//! - JSON-RPC 2.0 server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state and the per-client session registry

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::catalog::ExampleCatalog;
use crate::commit::Committer;
use crate::config::Config;
use crate::error::{AppResult, SessionError, SessionResult};
use crate::flow::AnnotationFlow;
use crate::resilient::ResilientStore;
use crate::session::SessionState;
use crate::store::TabularStore;

/// A session shared between the registry and the handler working on it.
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Live annotation sessions keyed by session id.
///
/// Each session is locked for the whole of an action, so actions on one
/// session never interleave while different sessions proceed independently.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under a fresh id.
    pub async fn insert(&self, session: SessionState) -> (String, SessionHandle) {
        let id = Uuid::new_v4().to_string();
        let handle = Arc::new(Mutex::new(session));
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::clone(&handle));
        (id, handle)
    }

    pub async fn get(&self, session_id: &str) -> SessionResult<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSession {
                session_id: session_id.to_string(),
            })
    }

    pub async fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Annotation flow controller.
    pub flow: AnnotationFlow,
    /// Live sessions.
    pub sessions: SessionRegistry,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, flow: AnnotationFlow) -> Self {
        tracing::info!(
            spreadsheet = %config.tables.spreadsheet,
            policy = %config.persistence.policy,
            "AppState initializing"
        );

        Self {
            config,
            flow,
            sessions: SessionRegistry::new(),
        }
    }

    /// Open the workbook through the retrying wrapper and wire the flow.
    pub async fn connect(config: Config, store: Arc<dyn TabularStore>) -> AppResult<Self> {
        let resilient = ResilientStore::new(store, config.retry.clone());
        let workbook = resilient.open_workbook(&config.tables).await?;

        let catalog = Arc::new(ExampleCatalog::new(resilient.clone(), &workbook));
        let committer = Committer::new(
            resilient,
            workbook.results.clone(),
            config.persistence.policy,
            config.persistence.include_answer_id,
        );

        Ok(Self::new(config, AnnotationFlow::new(catalog, committer)))
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::{
        LogFormat, LoggingConfig, PersistenceConfig, RequestConfig, RetryConfig, SheetsConfig,
        TableConfig,
    };
    use crate::store::MemoryStore;
    use serde_json::json;

    pub fn create_test_config() -> Config {
        Config {
            sheets: SheetsConfig {
                access_token: "test-token".to_string(),
                sheets_base_url: "https://sheets.googleapis.com".to_string(),
                drive_base_url: "https://www.googleapis.com".to_string(),
            },
            tables: TableConfig {
                spreadsheet: "study".to_string(),
                ..TableConfig::default()
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            request: RequestConfig::default(),
            retry: RetryConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }

    pub fn study_store() -> Arc<MemoryStore> {
        Arc::new(
            MemoryStore::new("study")
                .with_table(
                    "examples",
                    &["example_id", "claim", "sentence_1", "sentence_2"],
                    vec![vec![json!(101), json!("X is true"), json!("s1"), json!("s2")]],
                )
                .with_table(
                    "assignments",
                    &["user_id", "example_ids"],
                    vec![vec![json!("user_7"), json!("[101]")]],
                )
                .with_table("results", &["user_id"], Vec::new()),
        )
    }

    pub async fn create_test_state(store: Arc<MemoryStore>) -> SharedState {
        Arc::new(
            AppState::connect(create_test_config(), store)
                .await
                .expect("Failed to connect test state"),
        )
    }
}
