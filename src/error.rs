use thiserror::Error;

pub type Result<T> = std::result::Result<T, LogQueryError>;

#[derive(Debug, Error)]
pub enum LogQueryError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("无效请求: {0}")]
    InvalidInput(String),

    #[error("时间范围过大: {requested_secs}s 超过上限 {max_secs}s")]
    RangeTooWide { requested_secs: i64, max_secs: i64 },

    #[error("页码超出范围: {page} > {max_page}")]
    PageOutOfRange { page: u32, max_page: u32 },

    #[error("远程服务暂时不可用 (尝试 {attempts} 次, 状态 {status:?}): {cause}")]
    TransientRemoteFailure {
        attempts: u32,
        status: Option<u16>,
        cause: String,
    },

    #[error("远程服务拒绝请求: HTTP {status} - {body}")]
    TerminalRemoteFailure { status: u16, body: String },

    #[error("响应格式错误 (content-type: {content_type}, {line_count} 行): {excerpt}")]
    MalformedResponse {
        content_type: String,
        line_count: usize,
        excerpt: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LogQueryError {
    /// Whether a retry may succeed; only remote hiccups qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LogQueryError::TransientRemoteFailure { .. })
    }
}

/// Cut `text` to at most `max_chars` characters, appending `...` when shortened.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
