//! Tool definitions and the request loop.

use super::*;
use crate::server::test_support::{create_test_state, study_store};
use serde_json::json;

// ============================================================================
// Tool definition tests
// ============================================================================

#[test]
fn test_all_tools_count() {
    assert_eq!(all_tools().len(), 6, "Should have exactly 6 tools defined");
}

#[test]
fn test_all_tools_have_valid_schemas() {
    for tool in all_tools() {
        assert!(tool.name.starts_with("annotate_"), "Unexpected name {}", tool.name);
        assert!(
            !tool.description.is_empty(),
            "Tool description should not be empty"
        );
        assert_eq!(
            tool.input_schema["type"], "object",
            "Schema type should be object for {}",
            tool.name
        );
        assert!(
            tool.input_schema["properties"].is_object(),
            "Schema should have properties for {}",
            tool.name
        );
        assert_eq!(tool.input_schema["additionalProperties"], false);
    }
}

#[test]
fn test_tool_names_are_unique() {
    let tools = all_tools();
    let mut names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    names.sort();
    let original_len = names.len();
    names.dedup();

    assert_eq!(names.len(), original_len, "All tool names should be unique");
}

#[test]
fn test_session_tools_require_session_id() {
    for tool in all_tools().into_iter().filter(|t| t.name != "annotate_login") {
        let required = tool.input_schema["required"].as_array().unwrap();
        assert!(
            required.contains(&json!("session_id")),
            "{} should require session_id",
            tool.name
        );
    }
}

#[test]
fn test_login_tool_schema() {
    let tool = get_login_tool();
    assert_eq!(tool.input_schema["required"], json!(["user_id"]));
    assert_eq!(tool.input_schema["properties"]["session_id"]["type"], "string");
}

#[test]
fn test_decide_tool_enumerates_decisions() {
    let tool = get_decide_tool();
    assert_eq!(
        tool.input_schema["properties"]["decision"]["enum"],
        json!(["support", "refute", "cannot_decide"])
    );
}

// ============================================================================
// Request loop tests
// ============================================================================

async fn run_lines(input: &str) -> Vec<Value> {
    let server = McpServer::new(create_test_state(study_store()).await);
    let mut output = Vec::new();
    server.serve(input.as_bytes(), &mut output).await.unwrap();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_serve_initialize_and_list() {
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"initialized"}"#,
        "\n\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        "\n",
    );

    let responses = run_lines(input).await;

    assert_eq!(responses.len(), 2, "Notifications and blank lines get no reply");
    assert_eq!(responses[0]["result"]["protocolVersion"], PROTOCOL_VERSION);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "evidence-annotator");
    assert_eq!(responses[0]["result"]["capabilities"]["tools"]["listChanged"], false);
    assert_eq!(responses[1]["id"], 2);
    assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_serve_parse_error_and_unknown_method() {
    let input = concat!(
        "not json\n",
        r#"{"jsonrpc":"2.0","id":"x","method":"resources/list"}"#,
        "\n",
    );

    let responses = run_lines(input).await;

    assert_eq!(responses[0]["error"]["code"], -32700);
    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[1]["error"]["code"], -32601);
    assert_eq!(responses[1]["id"], "x");
}

#[tokio::test]
async fn test_serve_tool_call_login() {
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"annotate_login","arguments":{"user_id":"user_7"}}}"#,
        "\n",
    );

    let responses = run_lines(input).await;

    assert!(responses[0]["result"].get("isError").is_none());
    let text = responses[0]["result"]["content"][0]["text"].as_str().unwrap();
    let body: Value = serde_json::from_str(text).unwrap();
    assert_eq!(body["phase"], "in_progress");
    assert_eq!(body["example_id"], 101);
    assert!(body["session_id"].is_string());
}

#[tokio::test]
async fn test_serve_tool_error_is_reported_in_result() {
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"annotate_decide","arguments":{"session_id":"nope","decision":"maybe"}}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":9,"method":"tools/call"}"#,
        "\n",
    );

    let responses = run_lines(input).await;

    assert_eq!(responses[0]["result"]["isError"], true);
    let text = responses[0]["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("Error: Invalid parameters for annotate_decide"));
    assert_eq!(responses[1]["error"]["code"], -32602);
}

#[tokio::test]
async fn test_serve_ping_and_notifications() {
    let input = concat!(
        r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":3}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"notifications/unheard_of"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":"p-1","method":"ping"}"#,
        "\n",
    );

    let responses = run_lines(input).await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], "p-1");
    assert_eq!(responses[0]["result"], json!({}));
    assert!(responses[0].get("error").is_none());
}

#[tokio::test]
async fn test_serve_successful_tool_call_has_no_error_flag() {
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"annotate_login","arguments":{"user_id":"user_404"}}}"#,
        "\n",
    );

    let responses = run_lines(input).await;

    assert!(responses[0].get("error").is_none());
    assert_eq!(responses[0]["result"]["content"][0]["type"], "text");
    assert!(responses[0]["result"].get("isError").is_none());
}
