use dremioai::app::App;
use dremioai::mcp::server::McpServer;
use dremioai::services::settings::Settings;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::BufReader;

fn server() -> McpServer {
    McpServer::new(Arc::new(App::initialize(Settings::default()).expect("app")))
}

async fn call(server: &McpServer, line: &str) -> Value {
    let response = server.handle_line(line).await.expect("response");
    serde_json::to_value(&response).expect("encode")
}

#[tokio::test]
async fn initialize_advertises_capabilities() {
    let server = server();
    let line = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#;
    let response = call(&server, line).await;
    assert_eq!(response["id"], json!(1));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("Dremio"));
    assert!(response["result"]["capabilities"]["tools"].is_object());
    assert!(response["result"]["capabilities"]["prompts"].is_object());
}

#[tokio::test]
async fn notifications_and_blank_lines_get_no_reply() {
    let server = server();
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await
        .is_none());
    assert!(server.handle_line("   ").await.is_none());
}

#[tokio::test]
async fn malformed_input_is_answered_with_protocol_errors() {
    let server = server();
    let parse = call(&server, "{not json").await;
    assert_eq!(parse["error"]["code"], json!(-32700));
    assert_eq!(parse["id"], Value::Null);

    let invalid = call(&server, r#"{"id":3}"#).await;
    assert_eq!(invalid["error"]["code"], json!(-32600));

    let unknown = call(&server, r#"{"jsonrpc":"2.0","id":4,"method":"tools/unknown"}"#).await;
    assert_eq!(unknown["error"]["code"], json!(-32601));
}

#[tokio::test]
async fn tools_list_follows_the_active_mode() {
    let server = server();
    let response = call(&server, r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#).await;
    let tools = response["result"]["tools"].as_array().cloned().unwrap_or_default();
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert!(names.contains(&"RunSqlQuery"));
    assert!(!names.contains(&"RunPromQL"));
    assert!(tools.iter().all(|t| t["inputSchema"].is_object()));
}

#[tokio::test]
async fn hidden_tools_fail_with_tool_unavailable() {
    let server = server();
    let response = call(
        &server,
        r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"RunPromQL","arguments":{"query":"up"}}}"#,
    )
    .await;
    assert_eq!(response["error"]["code"], json!(-32002));
    let message = response["error"]["message"].as_str().unwrap_or_default();
    assert!(message.starts_with("DremioError"));
    assert!(message.contains("tool: RunPromQL"));
}

#[tokio::test]
async fn tool_results_are_text_content() {
    let server = server();
    let response = call(
        &server,
        r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"GetNameOfJobsRecentTable"}}"#,
    )
    .await;
    let text = response["result"]["content"][0]["text"].as_str().unwrap_or_default();
    assert_eq!(
        serde_json::from_str::<Value>(text).expect("json"),
        json!({"name": "sys.jobs_recent"})
    );
    assert_eq!(response["result"]["_meta"]["tool"], json!("GetNameOfJobsRecentTable"));

    let invalid = call(
        &server,
        r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"RunSqlQuery","arguments":{}}}"#,
    )
    .await;
    assert_eq!(invalid["error"]["code"], json!(-32602));
}

#[tokio::test]
async fn resources_and_prompt_are_served() {
    let server = server();
    let listed = call(&server, r#"{"jsonrpc":"2.0","id":8,"method":"resources/list"}"#).await;
    assert_eq!(listed["result"]["resources"][0]["uri"], json!("dremio://hints"));

    let read = call(
        &server,
        r#"{"jsonrpc":"2.0","id":9,"method":"resources/read","params":{"uri":"dremio://hints"}}"#,
    )
    .await;
    assert_eq!(read["result"]["contents"][0]["mimeType"], json!("text/plain"));

    let prompt = call(
        &server,
        r#"{"jsonrpc":"2.0","id":10,"method":"prompts/get","params":{"name":"System Prompt"}}"#,
    )
    .await;
    let text = prompt["result"]["messages"][0]["content"]["text"]
        .as_str()
        .unwrap_or_default();
    assert!(text.contains("RunSqlQuery"));
    assert!(!text.contains("RunPromQL"));
}

#[tokio::test]
async fn serve_answers_each_request_line() {
    let server = server();
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"prompts/list"}"#,
        "\n",
    );
    let mut output: Vec<u8> = Vec::new();
    server
        .serve(BufReader::new(input.as_bytes()), &mut output)
        .await
        .expect("serve");

    let lines: Vec<Value> = String::from_utf8(output)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["id"], json!(1));
    assert_eq!(lines[1]["result"]["prompts"][0]["name"], json!("System Prompt"));
}
