//! `get_logs_schema` 的静态说明数据，不依赖远端状态。

use serde_json::{json, Value};

fn fields() -> Value {
    json!([
        { "name": "timestamp", "type": "datetime", "description": "Event time (ISO-8601)." },
        { "name": "severity", "type": "string", "description": "DEBUG, VERBOSE, INFO, WARN, ERROR or FATAL." },
        { "name": "message", "type": "string", "description": "Log text; long values are truncated." },
        { "name": "applicationName", "type": "string", "description": "Application that produced the log." },
        { "name": "subsystemName", "type": "string", "description": "Component within the application." },
        { "name": "hostname", "type": "string", "description": "Host or computer name." },
        { "name": "className", "type": "string", "description": "Emitting class, when reported." },
        { "name": "methodName", "type": "string", "description": "Emitting method, when reported." },
        { "name": "threadId", "type": "string", "description": "Thread identifier." },
        { "name": "category", "type": "string", "description": "Producer-defined category." },
        { "name": "additionalFields", "type": "object", "description": "Any other keys on the record." }
    ])
}

fn examples() -> Value {
    json!({
        "lucene": [
            { "query": "error", "description": "Exact phrase search for 'error'." },
            { "query": "severity:ERROR AND applicationName:checkout", "description": "Errors from one application." },
            { "query": "message:\"connection refused\"", "description": "Phrase inside the message field." },
            { "query": "*", "description": "Everything in the time window." }
        ],
        "dataprime": [
            { "query": "source logs | filter $m.severity == ERROR", "description": "Errors only." },
            { "query": "source logs | filter $d.message.contains('timeout') | limit 20", "description": "Messages mentioning timeout." },
            { "query": "source logs | groupby $l.applicationname aggregate count() as total", "description": "Volume per application." }
        ]
    })
}

fn tips() -> Value {
    json!({
        "lucene": [
            "Plain text without ':' '(' or '\"' is searched as an exact phrase.",
            "Use field:value pairs to narrow results."
        ],
        "dataprime": [
            "Pipe stages (| filter, | limit, | sort, | groupby) select DataPrime automatically.",
            "A '| limit' stage sized to reach the requested page is appended when the query has none.",
            "An explicit '| limit' in the query also caps how far later pages can reach."
        ],
        "general": [
            "Time windows are capped at 24 hours; use timeframe=custom with startDate/endDate for older data.",
            "limit is clamped to 1..50; use page to walk further results.",
            "hasNextPage is a hint: a full page suggests more results may exist."
        ]
    })
}

fn advanced() -> Value {
    json!({
        "keypaths": {
            "$d": "User data (the log payload).",
            "$m": "Metadata such as severity and timestamp.",
            "$l": "Labels such as applicationname and subsystemname."
        },
        "operators": ["filter", "limit", "sort", "groupby", "summarize", "choose", "extract"],
        "textFunctions": ["contains", "startsWith", "endsWith"],
        "archive": "Ranges that start more than 24 hours ago also search the archive tier."
    })
}

pub fn logs_schema(include_examples: bool, include_advanced: bool) -> Value {
    let mut schema = json!({
        "dialects": ["lucene", "dataprime"],
        "timeframes": ["15m", "1h", "6h", "24h", "custom"],
        "fields": fields(),
        "tips": tips(),
    });
    if include_examples {
        schema["examples"] = examples();
    }
    if include_advanced {
        schema["advanced"] = advanced();
    }
    schema
}
