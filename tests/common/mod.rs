//! Scripted stand-in for the remote query endpoint.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use log_query_mcp::config::Config;
use serde_json::Value;
use tokio::net::TcpListener;

pub const QUERY_PATH: &str = "/api/v1/dataprime/query";

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into(),
        }
    }

    pub fn ndjson(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "application/x-ndjson",
            body: body.into(),
        }
    }
}

#[derive(Clone)]
struct MockState {
    script: Arc<Vec<Reply>>,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<String>>>,
}

pub struct MockRemote {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<String>>>,
}

impl MockRemote {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }

    pub fn auth_headers(&self) -> Vec<String> {
        self.auth.lock().unwrap().clone()
    }
}

async fn handle_query(
    State(state): State<MockState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let n = state.hits.fetch_add(1, Ordering::SeqCst);
    if let Ok(v) = serde_json::from_str::<Value>(&body) {
        state.bodies.lock().unwrap().push(v);
    }
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        state.auth.lock().unwrap().push(auth.to_string());
    }

    let reply = state
        .script
        .get(n)
        .or_else(|| state.script.last())
        .cloned()
        .unwrap_or_else(|| Reply::json(200, "{\"logs\":[]}"));
    let status = StatusCode::from_u16(reply.status).unwrap();
    (status, [(header::CONTENT_TYPE, reply.content_type)], reply.body).into_response()
}

/// Serves `script` in order; the last reply repeats once the script runs out.
pub async fn spawn_remote(script: Vec<Reply>) -> MockRemote {
    let state = MockState {
        script: Arc::new(script),
        hits: Arc::new(AtomicUsize::new(0)),
        bodies: Arc::new(Mutex::new(Vec::new())),
        auth: Arc::new(Mutex::new(Vec::new())),
    };
    let remote = MockRemote {
        base_url: String::new(),
        hits: state.hits.clone(),
        bodies: state.bodies.clone(),
        auth: state.auth.clone(),
    };

    let router = Router::new()
        .route(QUERY_PATH, post(handle_query))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    MockRemote {
        base_url: format!("http://{addr}"),
        ..remote
    }
}

/// A loopback address nothing listens on.
pub async fn closed_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn test_config(base_url: &str, base_delay_ms: u64, max_retries: u32) -> Config {
    let mut cfg = Config::default();
    cfg.api.api_key = "test-key".into();
    cfg.api.base_url = Some(base_url.to_string());
    cfg.api.timeout_ms = 2_000;
    cfg.retry.base_delay_ms = base_delay_ms;
    cfg.retry.max_retries = max_retries;
    cfg
}

pub fn stream_body(query_id: &str, messages: &[&str]) -> String {
    let results: Vec<Value> = messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "metadata": [
                    {"key": "timestamp", "value": "2024-01-15T10:00:00Z"},
                    {"key": "severity", "value": "Error"}
                ],
                "labels": [{"key": "applicationname", "value": "checkout"}],
                "userData": serde_json::json!({"message": m}).to_string()
            })
        })
        .collect();
    format!(
        "{}\n{}\n",
        serde_json::json!({"queryId": {"queryId": query_id}}),
        serde_json::json!({"result": {"results": results}})
    )
}
