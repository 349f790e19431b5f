use std::time::Duration;

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::{ApiConfig, RetryConfig};
use crate::context::QueryContext;
use crate::error::{excerpt, LogQueryError, Result};
use crate::model::{value_to_text, Dialect, RawLogRecord, TimeRange};

const BODY_EXCERPT_CHARS: usize = 500;
const MALFORMED_EXCERPT_CHARS: usize = 200;
const USER_AGENT: &str = concat!("log-query-mcp/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuerySyntax {
    #[serde(rename = "QUERY_SYNTAX_LUCENE")]
    Lucene,
    #[serde(rename = "QUERY_SYNTAX_DATAPRIME")]
    Dataprime,
}

impl From<Dialect> for QuerySyntax {
    fn from(d: Dialect) -> Self {
        match d {
            Dialect::Lucene => QuerySyntax::Lucene,
            Dialect::Dataprime => QuerySyntax::Dataprime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "TIER_ARCHIVE")]
    Archive,
    #[serde(rename = "TIER_FREQUENT_SEARCH")]
    FrequentSearch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteQueryMetadata {
    pub syntax: QuerySyntax,
    pub start_date: String,
    pub end_date: String,
    pub limit: u32,
    pub tier: Tier,
    pub default_source: String,
}

/// Request body sent to the remote query endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteQueryRequest {
    pub query: String,
    pub metadata: RemoteQueryMetadata,
}

impl RemoteQueryRequest {
    pub fn new(
        query: String,
        dialect: Dialect,
        range: TimeRange,
        limit: u32,
        archive: bool,
    ) -> Self {
        Self {
            query,
            metadata: RemoteQueryMetadata {
                syntax: dialect.into(),
                start_date: range.start.to_rfc3339_opts(SecondsFormat::Millis, true),
                end_date: range.end.to_rfc3339_opts(SecondsFormat::Millis, true),
                limit,
                tier: if archive { Tier::Archive } else { Tier::FrequentSearch },
                default_source: "logs".to_string(),
            },
        }
    }

    /// The limit is inflated by the page offset so the page can be sliced locally.
    pub fn from_context(ctx: &QueryContext) -> Self {
        Self::new(
            ctx.optimized_query.clone(),
            ctx.dialect,
            ctx.time_range,
            ctx.remote_limit(),
            ctx.include_archive,
        )
    }

    pub fn include_archive(&self) -> bool {
        self.metadata.tier == Tier::Archive
    }
}

/// Raw records plus what the server said about them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteQueryResponse {
    pub logs: Vec<RawLogRecord>,
    pub total: Option<usize>,
    pub query_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// `base_delay * 2^attempt`, attempt counted from zero.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: cfg.base_delay(),
        }
    }
}

/// 远程查询执行器：单次 POST + 指数退避重试 + 容错解析。
#[derive(Clone)]
pub struct QueryExecutor {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl QueryExecutor {
    pub fn new(api: &ApiConfig, retry: &RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(api.timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LogQueryError::ConfigError(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: api.endpoint()?,
            api_key: api.api_key.clone(),
            timeout: api.timeout(),
            retry: retry.into(),
        })
    }

    pub async fn execute(&self, request: &RemoteQueryRequest) -> Result<RemoteQueryResponse> {
        let mut attempt: u32 = 0;
        loop {
            match self.send_once(request, attempt + 1).await {
                Ok(response) => {
                    debug!(
                        attempt,
                        records = response.logs.len(),
                        query_id = ?response.query_id,
                        "remote query succeeded"
                    );
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "transient remote failure, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempts = attempt + 1, error = %e, "remote query failed");
                    return Err(e);
                }
            }
        }
    }

    /// One POST. Failures worth retrying come back as `TransientRemoteFailure`
    /// stamped with `attempts`.
    async fn send_once(
        &self,
        request: &RemoteQueryRequest,
        attempts: u32,
    ) -> Result<RemoteQueryResponse> {
        let transient = |status: Option<u16>, cause: String| LogQueryError::TransientRemoteFailure {
            attempts,
            status,
            cause,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    LogQueryError::ConfigError(format!("invalid request to {}: {e}", self.endpoint))
                } else if e.is_timeout() {
                    transient(
                        None,
                        format!("request timed out after {}ms", self.timeout.as_millis()),
                    )
                } else {
                    transient(None, e.to_string())
                }
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await.map_err(|e| {
            transient(Some(status.as_u16()), format!("failed to read response body: {e}"))
        })?;

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(transient(Some(status.as_u16()), excerpt(&body, BODY_EXCERPT_CHARS)));
        }
        if !status.is_success() {
            return Err(LogQueryError::TerminalRemoteFailure {
                status: status.as_u16(),
                body: excerpt(&body, BODY_EXCERPT_CHARS),
            });
        }

        parse_response(&body, &content_type)
    }

    /// Minimal one-row probe; any failure reads as `false`.
    pub async fn test_connection(&self) -> bool {
        let now = Utc::now();
        let probe = RemoteQueryRequest::new(
            "*".to_string(),
            Dialect::Lucene,
            TimeRange {
                start: now - ChronoDuration::minutes(1),
                end: now,
            },
            1,
            false,
        );
        match self.send_once(&probe, 1).await {
            Ok(_) => {
                info!(endpoint = %self.endpoint, "connectivity probe succeeded");
                true
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "connectivity probe failed");
                false
            }
        }
    }
}

/// Parses either a single JSON document or newline-delimited JSON.
pub fn parse_response(body: &str, content_type: &str) -> Result<RemoteQueryResponse> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(RemoteQueryResponse::default());
    }

    if let Ok(document) = serde_json::from_str::<Value>(trimmed) {
        return Ok(match document {
            Value::Array(items) => RemoteQueryResponse {
                logs: items.into_iter().map(RawLogRecord::from_value).collect(),
                ..Default::default()
            },
            other => from_stream(vec![other]),
        });
    }

    let lines: Vec<&str> = trimmed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let mut parsed = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        match serde_json::from_str::<Value>(line) {
            Ok(v) => parsed.push(v),
            Err(e) => {
                warn!(line = idx + 1, error = %e, "unparsable line in streamed response");
                return Err(LogQueryError::MalformedResponse {
                    content_type: content_type.to_string(),
                    line_count: lines.len(),
                    excerpt: excerpt(trimmed, MALFORMED_EXCERPT_CHARS),
                });
            }
        }
    }
    debug!(lines = parsed.len(), "parsed streamed response");
    Ok(from_stream(parsed))
}

fn from_stream(values: Vec<Value>) -> RemoteQueryResponse {
    let query_id = values
        .iter()
        .find_map(|v| v.get("queryId"))
        .and_then(extract_query_id);

    for v in &values {
        if let Some(warning) = v.get("warning") {
            warn!(warning = %warning, "remote query warning");
        }
        if let Some(err) = v.get("error") {
            warn!(error = %err, "remote query reported an error line");
        }
    }

    if let Some(result) = values.iter().find_map(|v| v.get("result")) {
        return RemoteQueryResponse {
            logs: records_in(result.get("results")),
            total: None,
            query_id,
        };
    }

    if let Some(holder) = values.iter().find(|v| v.get("logs").is_some()) {
        let logs = records_in(holder.get("logs"));
        let total = ["total", "totalCount", "totalResults"]
            .iter()
            .find_map(|k| holder.get(*k).and_then(Value::as_u64))
            .map(|n| n as usize);
        return RemoteQueryResponse {
            logs,
            total,
            query_id,
        };
    }

    debug!("response carried no result set");
    RemoteQueryResponse {
        query_id,
        ..Default::default()
    }
}

fn records_in(value: Option<&Value>) -> Vec<RawLogRecord> {
    match value {
        Some(Value::Array(items)) => items.iter().cloned().map(RawLogRecord::from_value).collect(),
        _ => Vec::new(),
    }
}

fn extract_query_id(value: &Value) -> Option<String> {
    match value {
        Value::Object(inner) => inner.get("queryId").map(value_to_text),
        Value::Null => None,
        other => Some(value_to_text(other)),
    }
}
