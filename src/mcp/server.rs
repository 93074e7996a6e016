use crate::app::App;
use crate::constants::resources::SYSTEM_PROMPT_NAME;
use crate::constants::server::{NAME as SERVER_NAME, PROTOCOL_VERSION, VERSION as SERVER_VERSION};
use crate::errors::{ErrorCode, McpError, ToolError, ToolErrorKind};
use crate::mcp::prompt::system_prompt;
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

fn map_tool_error(tool: &str, error: &ToolError) -> McpError {
    let mut lines = vec![
        "DremioError".to_string(),
        format!("tool: {}", tool),
        format!("kind: {:?}", error.kind).to_lowercase(),
        format!("code: {}", error.code),
        format!("retryable: {}", error.retryable),
        format!("message: {}", error.message),
    ];
    if let Some(hint) = &error.hint {
        lines.push(format!("hint: {}", hint));
    }
    if let Some(details) = &error.details {
        lines.push(format!("details: {}", details));
    }
    let message = lines.join("\n");

    match error.kind {
        ToolErrorKind::InvalidParams => McpError::new(ErrorCode::InvalidParams, message),
        ToolErrorKind::Timeout => McpError::new(ErrorCode::RequestTimeout, message),
        ToolErrorKind::Unavailable => McpError::new(ErrorCode::ToolUnavailable, message),
        ToolErrorKind::Denied | ToolErrorKind::NotFound => {
            McpError::new(ErrorCode::InvalidRequest, message)
        }
        ToolErrorKind::Upstream | ToolErrorKind::Internal => {
            McpError::new(ErrorCode::InternalError, message)
        }
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "{}".to_string()),
    }
}

pub struct McpServer {
    app: Arc<App>,
}

impl McpServer {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {"listChanged": false},
                "resources": {"listChanged": false},
                "prompts": {"listChanged": false},
            },
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    fn handle_tools_list(&self) -> Value {
        let settings = self.app.settings();
        let tools: Vec<Value> = self
            .app
            .registry
            .list_available(&settings.tools.mode, &settings)
            .into_iter()
            .map(|descriptor| descriptor.to_listing())
            .collect();
        serde_json::json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, request: &JsonRpcRequest) -> Result<Value, McpError> {
        let name = request
            .param_str("name")
            .ok_or_else(|| McpError::invalid_params("Missing tool name"))?;
        let args = request.params.get("arguments").cloned().unwrap_or(Value::Null);
        let envelope = self
            .app
            .tool_executor
            .execute(name, args)
            .await
            .map_err(|err| map_tool_error(name, &err))?;
        let result = envelope.get("result").cloned().unwrap_or(Value::Null);
        Ok(serde_json::json!({
            "content": [ { "type": "text", "text": as_text(&result) } ],
            "isError": false,
            "_meta": envelope.get("meta").cloned().unwrap_or(Value::Null),
        }))
    }

    fn handle_resources_list(&self) -> Value {
        let settings = self.app.settings();
        let resources: Vec<Value> = self
            .app
            .registry
            .list_resources(&settings.tools.mode, &settings)
            .into_iter()
            .map(|descriptor| descriptor.to_listing())
            .collect();
        serde_json::json!({ "resources": resources })
    }

    async fn handle_resources_read(&self, request: &JsonRpcRequest) -> Result<Value, McpError> {
        let uri = request
            .param_str("uri")
            .ok_or_else(|| McpError::invalid_params("Missing resource uri"))?;
        let envelope = self
            .app
            .tool_executor
            .read_resource(uri)
            .await
            .map_err(|err| map_tool_error(uri, &err))?;
        let result = envelope.get("result").cloned().unwrap_or(Value::Null);
        Ok(serde_json::json!({
            "contents": [ { "uri": uri, "mimeType": "text/plain", "text": as_text(&result) } ]
        }))
    }

    fn handle_prompts_list(&self) -> Value {
        serde_json::json!({
            "prompts": [{
                "name": SYSTEM_PROMPT_NAME,
                "description": "Guidance for analyzing the cluster with the exposed tools",
            }]
        })
    }

    fn handle_prompts_get(&self, request: &JsonRpcRequest) -> Result<Value, McpError> {
        let name = request
            .param_str("name")
            .ok_or_else(|| McpError::invalid_params("Missing prompt name"))?;
        if name != SYSTEM_PROMPT_NAME {
            return Err(McpError::invalid_params(format!("Unknown prompt: {}", name)));
        }
        let settings = self.app.settings();
        Ok(serde_json::json!({
            "description": SYSTEM_PROMPT_NAME,
            "messages": [{
                "role": "user",
                "content": {"type": "text", "text": system_prompt(&self.app.registry, &settings)},
            }]
        }))
    }

    /// Dispatches one request. Notifications produce no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = match request.id.clone() {
            Some(id) => id,
            None => {
                self.app.logger.debug(
                    "notification",
                    Some(&serde_json::json!({ "method": request.method })),
                );
                return None;
            }
        };

        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.handle_initialize()),
            "ping" => Ok(serde_json::json!({})),
            method if method.starts_with("notifications/") => Ok(serde_json::json!({})),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(&request).await,
            "resources/list" => Ok(self.handle_resources_list()),
            "resources/read" => self.handle_resources_read(&request).await,
            "prompts/list" => Ok(self.handle_prompts_list()),
            "prompts/get" => self.handle_prompts_get(&request),
            _ => Err(McpError::new(ErrorCode::MethodNotFound, "Method not found")),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::from_error(id, err),
        })
    }

    /// Parses one line of input. Malformed JSON and bad envelopes are answered
    /// with an error carrying a null id.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        let parsed: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(_) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    ErrorCode::ParseError,
                    "Parse error",
                ))
            }
        };
        match serde_json::from_value::<JsonRpcRequest>(parsed) {
            Ok(request) => self.handle_request(request).await,
            Err(_) => Some(JsonRpcResponse::failure(
                Value::Null,
                ErrorCode::InvalidRequest,
                "Invalid request",
            )),
        }
    }

    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), ToolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut writer = writer;

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|err| ToolError::internal(err.to_string()))?
        {
            if let Some(response) = self.handle_line(&line).await {
                let payload = serde_json::to_string(&response).unwrap_or_default();
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        self.app
            .logger
            .info("input closed", Some(&self.app.logger.stats()));
        Ok(())
    }

    pub async fn run_stdio(&self) -> Result<(), ToolError> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = BufWriter::new(tokio::io::stdout());
        self.serve(reader, writer).await
    }
}

pub async fn run_stdio(app: App) -> Result<(), ToolError> {
    let server = McpServer::new(Arc::new(app));
    server.run_stdio().await
}
