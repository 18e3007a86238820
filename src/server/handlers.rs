use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::SharedState;
use crate::error::{AppError, McpError, McpResult};
use crate::session::{Decision, SessionState};

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        "annotate_login" => handle_login(state, arguments).await,
        "annotate_view" => handle_view(state, arguments).await,
        "annotate_reveal_next" => handle_reveal_next(state, arguments).await,
        "annotate_decide" => handle_decide(state, arguments).await,
        "annotate_commit" => handle_commit(state, arguments).await,
        "annotate_end" => handle_end(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct LoginParams {
    user_id: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionParams {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct DecideParams {
    session_id: String,
    decision: Decision,
}

/// Tool result tagged with the session it applies to
#[derive(Debug, Serialize)]
struct SessionResponse<T: Serialize> {
    session_id: String,
    #[serde(flatten)]
    body: T,
}

/// Handle annotate_login - enter a user id, creating a session if needed
async fn handle_login(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: LoginParams = parse_arguments("annotate_login", arguments)?;

    let Some(session_id) = params.session_id else {
        // New sessions are registered only after a successful login
        let mut session = SessionState::new();
        let view = state
            .flow
            .login(&mut session, &params.user_id)
            .await
            .map_err(McpError::from)?;
        let (session_id, _) = state.sessions.insert(session).await;
        return respond(session_id, view);
    };

    let handle = state.sessions.get(&session_id).await.map_err(AppError::from)?;
    let mut session = handle.lock().await;
    let view = state
        .flow
        .login(&mut session, &params.user_id)
        .await
        .map_err(McpError::from)?;

    respond(session_id, view)
}

/// Handle annotate_view - render the session unchanged
async fn handle_view(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SessionParams = parse_arguments("annotate_view", arguments)?;
    let handle = state.sessions.get(&params.session_id).await.map_err(AppError::from)?;

    let session = handle.lock().await;
    let view = state.flow.view(&session).await.map_err(McpError::from)?;

    respond(params.session_id, view)
}

/// Handle annotate_reveal_next - show one more evidence sentence
async fn handle_reveal_next(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SessionParams = parse_arguments("annotate_reveal_next", arguments)?;
    let handle = state.sessions.get(&params.session_id).await.map_err(AppError::from)?;

    let mut session = handle.lock().await;
    let view = state
        .flow
        .reveal_next(&mut session)
        .await
        .map_err(McpError::from)?;

    respond(params.session_id, view)
}

/// Handle annotate_decide - record support / refute / cannot_decide
async fn handle_decide(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: DecideParams = parse_arguments("annotate_decide", arguments)?;
    let handle = state.sessions.get(&params.session_id).await.map_err(AppError::from)?;

    let mut session = handle.lock().await;
    let outcome = state
        .flow
        .decide(&mut session, params.decision)
        .await
        .map_err(McpError::from)?;

    respond(params.session_id, outcome)
}

/// Handle annotate_commit - flush pending answers to the results table
async fn handle_commit(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SessionParams = parse_arguments("annotate_commit", arguments)?;
    let handle = state.sessions.get(&params.session_id).await.map_err(AppError::from)?;

    let mut session = handle.lock().await;
    let result = state
        .flow
        .commit(&mut session)
        .await
        .map_err(McpError::from)?;

    respond(params.session_id, result)
}

/// Handle annotate_end - commit, then forget the session
///
/// The session survives a failed commit so the call can be repeated.
async fn handle_end(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let params: SessionParams = parse_arguments("annotate_end", arguments)?;
    let handle = state.sessions.get(&params.session_id).await.map_err(AppError::from)?;

    let result = {
        let mut session = handle.lock().await;
        state
            .flow
            .commit(&mut session)
            .await
            .map_err(McpError::from)?
    };
    state.sessions.remove(&params.session_id).await;

    info!(session_id = %params.session_id, "Session ended");
    respond(params.session_id, result)
}

// ============================================================================
// Helper functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

fn respond<T: Serialize>(session_id: String, body: T) -> McpResult<Value> {
    serde_json::to_value(SessionResponse { session_id, body }).map_err(McpError::Json)
}
