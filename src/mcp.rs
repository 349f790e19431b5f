use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::error::{LogQueryError, Result};
use crate::model::SearchRequest;
use crate::search::LogSearchService;

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaParams {
    #[serde(default)]
    include_examples: Option<bool>,
    #[serde(default)]
    include_advanced: Option<bool>,
}

pub async fn run_stdio(service: Arc<LogSearchService>) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = reader.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let req: RpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "unparsable rpc line");
                write_response(
                    &mut stdout,
                    error_response(Value::Null, -32700, format!("parse error: {e}")),
                )
                .await?;
                continue;
            }
        };

        if let Some(resp) = process_request(&service, req).await {
            write_response(&mut stdout, resp).await?;
        }
    }

    Ok(())
}

/// Dispatches one request; notifications yield `None`.
pub async fn process_request(service: &LogSearchService, req: RpcRequest) -> Option<RpcResponse> {
    let method = req.method.clone();
    debug!(method = %method, "rpc request");
    let resp = match method.as_str() {
        "initialize" => success(
            req.id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        ),
        "notifications/initialized" if req.id.is_null() => return None,
        "notifications/initialized" | "ping" => success(req.id, json!({})),
        "tools/list" => success(req.id, json!({ "tools": tool_definitions() })),
        "tools/call" => handle_tool_call(service, req).await,
        _ if method.starts_with("notifications/") && req.id.is_null() => return None,
        _ => error_response(req.id, -32601, format!("method not found: {method}")),
    };
    Some(resp)
}

async fn handle_tool_call(service: &LogSearchService, req: RpcRequest) -> RpcResponse {
    let params: ToolCallParams = match serde_json::from_value(req.params) {
        Ok(p) => p,
        Err(e) => return error_response(req.id, -32602, format!("invalid params: {e}")),
    };

    let outcome = match params.name.as_str() {
        "query_logs" => match parse_args::<SearchRequest>(params.arguments) {
            Ok(args) => service.query_logs(args).await.and_then(to_value),
            Err(e) => Err(e),
        },
        "analyze_logs" => match parse_args::<SearchRequest>(params.arguments) {
            Ok(args) => service.analyze_logs(args).await.and_then(to_value),
            Err(e) => Err(e),
        },
        "get_logs_schema" => {
            let args = if params.arguments.is_null() {
                Ok(SchemaParams::default())
            } else {
                parse_args::<SchemaParams>(params.arguments)
            };
            args.map(|a| {
                service.schema(
                    a.include_examples.unwrap_or(true),
                    a.include_advanced.unwrap_or(false),
                )
            })
        }
        other => return error_response(req.id, -32602, format!("unknown tool: {other}")),
    };

    match outcome {
        Ok(value) => success(req.id, tool_content(&value, false)),
        Err(e) => {
            warn!(tool = %params.name, error = %e, "tool call failed");
            success(req.id, tool_content(&Value::String(e.to_string()), true))
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T> {
    serde_json::from_value(arguments)
        .map_err(|e| LogQueryError::InvalidInput(format!("invalid arguments: {e}")))
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).map_err(LogQueryError::from)
}

fn tool_content(value: &Value, is_error: bool) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}

async fn write_response(stdout: &mut tokio::io::Stdout, resp: RpcResponse) -> Result<()> {
    let line = serde_json::to_string(&resp).unwrap_or_else(|_| "{}".to_string());
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

fn success(id: Value, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    }
}

fn error_response(id: Value, code: i32, message: String) -> RpcResponse {
    RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError { code, message }),
    }
}

fn search_input_schema() -> Value {
    json!({
        "type": "object",
        "required": ["query"],
        "properties": {
            "query": { "type": "string", "description": "Lucene or DataPrime query text." },
            "timeframe": { "type": "string", "enum": ["15m", "1h", "6h", "24h", "custom"] },
            "startDate": { "type": "string", "description": "ISO-8601, required when timeframe is custom." },
            "endDate": { "type": "string", "description": "ISO-8601, required when timeframe is custom." },
            "limit": { "type": "integer", "minimum": 1, "maximum": 50 },
            "page": { "type": "integer", "minimum": 1 }
        }
    })
}

fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "query_logs",
            "description": "Search logs with a Lucene or DataPrime query over a bounded time window. Results are normalized and truncated for compact reading.",
            "inputSchema": search_input_schema()
        }),
        json!({
            "name": "analyze_logs",
            "description": "Run a log query and return severity counts, top applications and the observed time span.",
            "inputSchema": search_input_schema()
        }),
        json!({
            "name": "get_logs_schema",
            "description": "Describe log fields, example queries and usage tips for both query dialects.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "includeExamples": { "type": "boolean" },
                    "includeAdvanced": { "type": "boolean" }
                }
            }
        }),
    ]
}
