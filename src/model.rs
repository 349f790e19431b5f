use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 调用方可选的预设时间窗口。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    Last15Minutes,
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "6h")]
    Last6Hours,
    #[serde(rename = "24h")]
    Last24Hours,
    #[serde(rename = "custom")]
    Custom,
}

impl Timeframe {
    /// Trailing window length; `None` for `custom`.
    pub fn duration(self) -> Option<Duration> {
        match self {
            Timeframe::Last15Minutes => Some(Duration::minutes(15)),
            Timeframe::LastHour => Some(Duration::hours(1)),
            Timeframe::Last6Hours => Some(Duration::hours(6)),
            Timeframe::Last24Hours => Some(Duration::hours(24)),
            Timeframe::Custom => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Lucene,
    Dataprime,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Lucene => "lucene",
            Dialect::Dataprime => "dataprime",
        }
    }
}

/// `query_logs` 的入参。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub timeframe: Option<Timeframe>,
    #[serde(default, alias = "start_date", alias = "startTime", alias = "start")]
    pub start_date: Option<String>,
    #[serde(default, alias = "end_date", alias = "endTime", alias = "end")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub page: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn span(&self) -> Duration {
        self.end - self.start
    }
}

/// A log record as the remote API returned it: the known fields plus
/// whatever else the producer attached.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct RawLogRecord {
    pub timestamp: Option<Value>,
    pub severity: Option<Value>,
    pub message: Option<Value>,
    pub text: Option<Value>,
    pub application_name: Option<Value>,
    pub subsystem_name: Option<Value>,
    pub hostname: Option<Value>,
    pub class_name: Option<Value>,
    pub method_name: Option<Value>,
    pub thread_id: Option<Value>,
    pub category: Option<Value>,
    pub extra: Map<String, Value>,
}

const TIMESTAMP_KEYS: &[&str] = &["timestamp", "@timestamp"];
const SEVERITY_KEYS: &[&str] = &["severity", "level"];
const MESSAGE_KEYS: &[&str] = &["message", "msg"];
const TEXT_KEYS: &[&str] = &["text", "log"];
const APPLICATION_KEYS: &[&str] = &["applicationName", "applicationname"];
const SUBSYSTEM_KEYS: &[&str] = &["subsystemName", "subsystemname"];
const HOST_KEYS: &[&str] = &["computerName", "computername", "hostname", "host"];
const CLASS_KEYS: &[&str] = &["className", "classname"];
const METHOD_KEYS: &[&str] = &["methodName", "methodname"];
const THREAD_KEYS: &[&str] = &["threadId", "threadid"];
const CATEGORY_KEYS: &[&str] = &["category"];

impl RawLogRecord {
    /// Flattens the vendor envelope (`metadata`/`labels` key-value arrays and
    /// the `userData` JSON string) into one flat record.
    pub fn from_value(value: Value) -> Self {
        let mut obj = match value {
            Value::Object(obj) => obj,
            Value::Null => Map::new(),
            other => {
                let mut obj = Map::new();
                obj.insert("message".into(), other);
                obj
            }
        };

        let mut flat = Map::new();
        for envelope in ["metadata", "labels"] {
            match obj.remove(envelope) {
                Some(Value::Array(pairs)) => merge_key_values(&mut flat, pairs),
                Some(other) => {
                    flat.insert(envelope.to_string(), other);
                }
                None => {}
            }
        }
        match obj.remove("userData") {
            Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(user)) => flat.extend(user),
                _ => {
                    flat.insert("message".into(), Value::String(raw));
                }
            },
            Some(Value::Object(user)) => flat.extend(user),
            Some(other) => {
                flat.insert("userData".into(), other);
            }
            None => {}
        }
        flat.extend(obj);

        Self::from_flat(flat)
    }

    fn from_flat(mut map: Map<String, Value>) -> Self {
        Self {
            timestamp: take_first(&mut map, TIMESTAMP_KEYS),
            severity: take_first(&mut map, SEVERITY_KEYS),
            message: take_first(&mut map, MESSAGE_KEYS),
            text: take_first(&mut map, TEXT_KEYS),
            application_name: take_first(&mut map, APPLICATION_KEYS),
            subsystem_name: take_first(&mut map, SUBSYSTEM_KEYS),
            hostname: take_first(&mut map, HOST_KEYS),
            class_name: take_first(&mut map, CLASS_KEYS),
            method_name: take_first(&mut map, METHOD_KEYS),
            thread_id: take_first(&mut map, THREAD_KEYS),
            category: take_first(&mut map, CATEGORY_KEYS),
            extra: map,
        }
    }

    /// Message body, falling back to the `text`/`log` fields.
    pub fn body(&self) -> Option<&Value> {
        self.message.as_ref().or(self.text.as_ref())
    }
}

impl From<Value> for RawLogRecord {
    fn from(value: Value) -> Self {
        RawLogRecord::from_value(value)
    }
}

fn merge_key_values(flat: &mut Map<String, Value>, pairs: Vec<Value>) {
    for pair in pairs {
        if let (Some(Value::String(key)), Some(value)) = (pair.get("key"), pair.get("value")) {
            flat.insert(key.clone(), value.clone());
        }
    }
}

/// Removes every alias from `map`, keeping the first non-null value.
fn take_first(map: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    let mut found = None;
    for key in keys {
        if let Some(v) = map.remove(*key) {
            if found.is_none() && !v.is_null() {
                found = Some(v);
            }
        }
    }
    found
}

/// Renders a JSON scalar as plain text; containers become compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 面向 AI 消费的固定结构日志。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedLogRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub severity: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsystem_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_fields: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySummary {
    pub total_results: usize,
    pub results_shown: usize,
    pub requested_limit: u32,
    pub time_range: TimeRange,
    pub page: u32,
    pub has_next_page: bool,
    pub query_type: Dialect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub next_page_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub summary: QuerySummary,
    pub logs: Vec<NormalizedLogRecord>,
    pub pagination: Pagination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedRange {
    pub earliest: String,
    pub latest: String,
}

/// Aggregate view over a batch of normalized records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSummary {
    pub total_logs: usize,
    pub severity_counts: BTreeMap<String, usize>,
    pub top_applications: Vec<ApplicationCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<ObservedRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogAnalysis {
    pub summary: QuerySummary,
    pub analysis: LogSummary,
}
