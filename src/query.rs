//! 查询方言识别与发送前的查询文本优化。

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::model::Dialect;

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

static DATAPRIME_SIGNATURES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\|\s*(filter|limit|sort|groupby|summarize|choose|extract)\b",
        r"(\.|\b)(contains|startswith|endswith)\s*\(",
        r"\b(contains|startswith|endswith)\s+['\x22]",
    ]
    .iter()
    .map(|p| case_insensitive(p))
    .collect()
});

static LIMIT_STAGE: Lazy<Regex> = Lazy::new(|| case_insensitive(r"\|\s*limit\b"));

/// Classifies `query` as DataPrime when any signature matches, Lucene otherwise.
pub fn detect_dialect(query: &str) -> Dialect {
    if DATAPRIME_SIGNATURES.iter().any(|re| re.is_match(query)) {
        Dialect::Dataprime
    } else {
        Dialect::Lucene
    }
}

/// Rewrites the query text for the remote engine. Applying it to its own
/// output returns the same string.
pub fn optimize_query(query: &str, dialect: Dialect, max_limit: u32) -> String {
    match dialect {
        Dialect::Lucene => {
            let trimmed = query.trim();
            if trimmed.is_empty() || trimmed == "*" {
                return query.to_string();
            }
            if trimmed.contains([':', '(', '"']) {
                query.to_string()
            } else {
                format!("\"{trimmed}\"")
            }
        }
        Dialect::Dataprime => {
            if LIMIT_STAGE.is_match(query) {
                query.to_string()
            } else {
                format!("{} | limit {max_limit}", query.trim_end())
            }
        }
    }
}
