//! 日志规范化：将远端返回的异构记录映射为固定结构，并控制输出体积。

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::config::NormalizerConfig;
use crate::context::QueryContext;
use crate::model::{
    value_to_text, ApplicationCount, LogSummary, NormalizedLogRecord, ObservedRange, Pagination,
    QueryResult, QuerySummary, RawLogRecord,
};

pub const HEAD_TAIL_MARKER: &str = "\n... [truncated] ...\n";
const FIELD_ELLIPSIS: &str = "...";
const TOP_APPLICATIONS: usize = 5;

static STACK_TRACE_SIGNATURES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?m)^\s*at\s+\S",
        r#"File "[^"]*", line \d+"#,
        r"(?m)^\s*[\w.$]+(Error|Exception):",
        r"(?m)^\s*Caused by:",
        r"(?m)^\s*\.\.\.\s*\d+\s+more",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid built-in pattern {p}: {e}")))
    .collect()
});

/// Canonical severity label for a raw severity value.
pub fn normalize_severity(raw: Option<&Value>) -> String {
    let text = raw.map(value_to_text).unwrap_or_default();
    let upper = text.trim().to_uppercase();
    let canonical = match upper.as_str() {
        "" => "UNKNOWN",
        "WARNING" => "WARN",
        "ERR" | "FAIL" | "FAILURE" => "ERROR",
        "CRITICAL" | "CRIT" | "EMERG" | "PANIC" | "ALERT" => "FATAL",
        "INFORMATION" => "INFO",
        "DBG" => "DEBUG",
        "1" => "DEBUG",
        "2" => "VERBOSE",
        "3" => "INFO",
        "4" => "WARN",
        "5" => "ERROR",
        "6" => "FATAL",
        _ => return upper,
    };
    canonical.to_string()
}

pub fn is_stack_trace(text: &str) -> bool {
    STACK_TRACE_SIGNATURES.iter().any(|re| re.is_match(text))
}

/// Bounds a message to `max_message_length` characters plus a fixed marker.
pub fn truncate_message(message: &str, cfg: &NormalizerConfig) -> String {
    let max = cfg.max_message_length;
    if message.chars().count() <= max {
        return message.to_string();
    }
    if is_stack_trace(message) {
        if let Some(kept) = truncate_stack_trace(message, max, cfg.stack_trace_lines) {
            return kept;
        }
    }
    truncate_head_tail(message, max)
}

/// Keeps the first line and as many following lines as fit in the budget.
/// `None` when the first line alone is over budget.
fn truncate_stack_trace(message: &str, max: usize, extra_lines: usize) -> Option<String> {
    let lines: Vec<&str> = message.lines().collect();
    let first = lines.first()?;
    let mut used = first.chars().count();
    if used > max {
        return None;
    }

    let mut out = first.to_string();
    let mut kept = 1;
    for line in lines.iter().skip(1).take(extra_lines) {
        let cost = line.chars().count() + 1;
        if used + cost > max {
            break;
        }
        out.push('\n');
        out.push_str(line);
        used += cost;
        kept += 1;
    }

    let omitted = lines.len() - kept;
    if omitted > 0 {
        out.push_str(&format!("\n... and {omitted} more lines"));
    }
    Some(out)
}

fn truncate_head_tail(message: &str, max: usize) -> String {
    let chars: Vec<char> = message.chars().collect();
    let head_len = max * 7 / 10;
    let tail_len = max - head_len;
    let head: String = chars[..head_len].iter().collect();
    let tail: String = chars[chars.len() - tail_len..].iter().collect();
    format!("{head}{HEAD_TAIL_MARKER}{tail}")
}

fn truncate_field(value: &Value, max: usize) -> Value {
    match value {
        Value::String(s) if s.chars().count() > max => {
            let cut: String = s.chars().take(max).collect();
            Value::String(format!("{cut}{FIELD_ELLIPSIS}"))
        }
        other => other.clone(),
    }
}

/// Numeric timestamps are epoch millis; larger magnitudes are micros or nanos.
fn normalize_timestamp(raw: &Value) -> Option<String> {
    match raw {
        Value::Null => None,
        Value::Number(n) => {
            let Some(v) = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)) else {
                return Some(n.to_string());
            };
            let dt = if v.abs() >= 100_000_000_000_000_000 {
                Some(DateTime::<Utc>::from_timestamp_nanos(v))
            } else if v.abs() >= 100_000_000_000_000 {
                DateTime::<Utc>::from_timestamp_micros(v)
            } else {
                DateTime::<Utc>::from_timestamp_millis(v)
            };
            Some(dt.map(|d| d.to_rfc3339()).unwrap_or_else(|| v.to_string()))
        }
        other => Some(value_to_text(other)),
    }
}

fn optional_text(value: &Option<Value>) -> Option<String> {
    value
        .as_ref()
        .map(value_to_text)
        .filter(|s| !s.is_empty())
}

/// 单条记录的规范化，纯函数。
pub fn normalize_record(raw: &RawLogRecord, cfg: &NormalizerConfig) -> NormalizedLogRecord {
    let message = raw.body().map(value_to_text).unwrap_or_default();

    let additional: BTreeMap<String, Value> = raw
        .extra
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), truncate_field(v, cfg.max_field_length)))
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .take(cfg.max_additional_fields)
        .collect();

    NormalizedLogRecord {
        timestamp: raw.timestamp.as_ref().and_then(normalize_timestamp),
        severity: normalize_severity(raw.severity.as_ref()),
        message: truncate_message(&message, cfg),
        application_name: optional_text(&raw.application_name),
        subsystem_name: optional_text(&raw.subsystem_name),
        hostname: optional_text(&raw.hostname),
        class_name: optional_text(&raw.class_name),
        method_name: optional_text(&raw.method_name),
        thread_id: optional_text(&raw.thread_id),
        category: optional_text(&raw.category),
        additional_fields: (!additional.is_empty()).then_some(additional),
    }
}

/// Shapes one page of raw records into the caller-facing result.
pub fn build_query_result(
    records: &[RawLogRecord],
    ctx: &QueryContext,
    page: u32,
    server_total: Option<usize>,
    cfg: &NormalizerConfig,
) -> QueryResult {
    let logs: Vec<NormalizedLogRecord> =
        records.iter().map(|r| normalize_record(r, cfg)).collect();
    let has_next_page = records.len() == ctx.limit as usize;

    QueryResult {
        summary: QuerySummary {
            total_results: server_total.unwrap_or(records.len()),
            results_shown: logs.len(),
            requested_limit: ctx.limit,
            time_range: ctx.time_range,
            page,
            has_next_page,
            query_type: ctx.dialect,
        },
        logs,
        pagination: Pagination {
            current_page: page,
            next_page_available: has_next_page,
        },
        query_id: None,
    }
}

/// Severity and application histograms plus the first/last timestamp seen.
/// Input is assumed to be time-ordered already.
pub fn summarize_logs(logs: &[NormalizedLogRecord]) -> LogSummary {
    let mut severity_counts = BTreeMap::new();
    let mut apps: HashMap<&str, usize> = HashMap::new();
    for log in logs {
        *severity_counts.entry(log.severity.clone()).or_insert(0) += 1;
        if let Some(app) = log.application_name.as_deref() {
            *apps.entry(app).or_insert(0) += 1;
        }
    }

    let mut top: Vec<ApplicationCount> = apps
        .into_iter()
        .map(|(name, count)| ApplicationCount {
            name: name.to_string(),
            count,
        })
        .collect();
    top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    top.truncate(TOP_APPLICATIONS);

    let mut stamps = logs.iter().filter_map(|l| l.timestamp.as_deref());
    let time_range = stamps.next().map(|first| ObservedRange {
        earliest: first.to_string(),
        latest: stamps.last().unwrap_or(first).to_string(),
    });

    LogSummary {
        total_logs: logs.len(),
        severity_counts,
        top_applications: top,
        time_range,
    }
}
