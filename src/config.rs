use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LogQueryError, Result};

pub const ENV_API_KEY: &str = "LOG_QUERY_API_KEY";
pub const ENV_DOMAIN: &str = "LOG_QUERY_DOMAIN";
pub const ENV_BASE_URL: &str = "LOG_QUERY_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "LOG_QUERY_TIMEOUT_MS";

const QUERY_PATH: &str = "/api/v1/dataprime/query";

/// 服务所在区域，每个区域对应固定的 API 域名。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Eu1,
    Eu2,
    Us1,
    Us2,
    Ap1,
    Ap2,
    Ap3,
}

impl Region {
    pub const ALL: [Region; 7] = [
        Region::Eu1,
        Region::Eu2,
        Region::Us1,
        Region::Us2,
        Region::Ap1,
        Region::Ap2,
        Region::Ap3,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Region::Eu1 => "eu1",
            Region::Eu2 => "eu2",
            Region::Us1 => "us1",
            Region::Us2 => "us2",
            Region::Ap1 => "ap1",
            Region::Ap2 => "ap2",
            Region::Ap3 => "ap3",
        }
    }

    pub fn domain(self) -> &'static str {
        match self {
            Region::Eu1 => "coralogix.com",
            Region::Eu2 => "eu2.coralogix.com",
            Region::Us1 => "coralogix.us",
            Region::Us2 => "cx498.coralogix.com",
            Region::Ap1 => "coralogix.in",
            Region::Ap2 => "coralogixsg.com",
            Region::Ap3 => "ap3.coralogix.com",
        }
    }

    /// Accepts a region code (`eu1`) or its bare domain (`coralogix.com`).
    pub fn parse(input: &str) -> Option<Region> {
        let needle = input.trim().to_ascii_lowercase();
        Region::ALL
            .into_iter()
            .find(|r| r.code() == needle || r.domain() == needle)
    }

    pub fn base_url(self) -> String {
        format!("https://ng-api-http.{}", self.domain())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub api_key: String,
    pub domain: String,
    /// 覆盖区域推导出的地址（代理或测试环境）。
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            domain: Region::Eu1.code().to_string(),
            base_url: None,
            timeout_ms: 30_000,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Full query endpoint URL.
    pub fn endpoint(&self) -> Result<String> {
        let base = match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => Region::parse(&self.domain)
                .ok_or_else(|| {
                    LogQueryError::ConfigError(format!("unknown domain: {}", self.domain))
                })?
                .base_url(),
        };
        Ok(format!("{base}{QUERY_PATH}"))
    }
}

/// 查询上下文的边界参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryLimits {
    pub default_limit: u32,
    pub min_limit: u32,
    pub max_limit: u32,
    pub max_page: u32,
    pub max_window_hours: i64,
    pub archive_threshold_hours: i64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: 10,
            min_limit: 1,
            max_limit: 50,
            max_page: 20,
            max_window_hours: 24,
            archive_threshold_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub max_message_length: usize,
    pub stack_trace_lines: usize,
    pub max_field_length: usize,
    pub max_additional_fields: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_message_length: 1000,
            stack_trace_lines: 5,
            max_field_length: 300,
            max_additional_fields: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub query: QueryLimits,
    pub normalizer: NormalizerConfig,
    pub retry: RetryConfig,
}

impl Config {
    /// 从 YAML 或 JSON 文件加载配置（按扩展名区分）。
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LogQueryError::ConfigError(format!("read {} failed: {e}", path.display()))
        })?;
        let is_json = matches!(path.extension().and_then(|s| s.to_str()), Some("json"));
        if is_json {
            serde_json::from_str(&raw)
                .map_err(|e| LogQueryError::ConfigError(format!("invalid json config: {e}")))
        } else {
            serde_yaml::from_str(&raw)
                .map_err(|e| LogQueryError::ConfigError(format!("invalid yaml config: {e}")))
        }
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Config::default();
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api.api_key = key;
        }
        if let Some(domain) = lookup(ENV_DOMAIN) {
            self.api.domain = domain;
        }
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.api.base_url = Some(url);
        }
        if let Some(ms) = lookup(ENV_TIMEOUT_MS) {
            self.api.timeout_ms = ms.trim().parse().map_err(|_| {
                LogQueryError::ConfigError(format!("{ENV_TIMEOUT_MS} is not a number: {ms}"))
            })?;
        }
        Ok(())
    }

    /// 启动时校验；失败即终止进程。
    pub fn validate(&self) -> Result<()> {
        if self.api.api_key.trim().is_empty() {
            return Err(LogQueryError::ConfigError(format!(
                "api key missing (set {ENV_API_KEY})"
            )));
        }
        if self.api.base_url.is_none() && Region::parse(&self.api.domain).is_none() {
            let known: Vec<&str> = Region::ALL.iter().map(|r| r.code()).collect();
            return Err(LogQueryError::ConfigError(format!(
                "unknown domain {:?}, expected one of {}",
                self.api.domain,
                known.join(", ")
            )));
        }
        let q = &self.query;
        if q.min_limit == 0 || q.min_limit > q.max_limit {
            return Err(LogQueryError::ConfigError(format!(
                "invalid limit bounds: {}..{}",
                q.min_limit, q.max_limit
            )));
        }
        if q.max_page == 0 || q.max_window_hours <= 0 {
            return Err(LogQueryError::ConfigError(
                "max_page and max_window_hours must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn region_parses_code_and_domain() {
        assert_eq!(Region::parse("EU2"), Some(Region::Eu2));
        assert_eq!(Region::parse("coralogix.us"), Some(Region::Us1));
        assert_eq!(Region::parse("mars1"), None);
    }

    #[test]
    fn endpoint_prefers_base_url_override() {
        let mut api = ApiConfig::default();
        assert_eq!(
            api.endpoint().unwrap(),
            "https://ng-api-http.coralogix.com/api/v1/dataprime/query"
        );
        api.base_url = Some("http://127.0.0.1:9000/".into());
        assert_eq!(api.endpoint().unwrap(), "http://127.0.0.1:9000/api/v1/dataprime/query");
    }

    #[test]
    fn validate_rejects_missing_key_and_bad_domain() {
        let mut cfg = Config::default();
        assert!(matches!(cfg.validate(), Err(LogQueryError::ConfigError(_))));

        cfg.api.api_key = "secret".into();
        cfg.api.domain = "nowhere".into();
        assert!(matches!(cfg.validate(), Err(LogQueryError::ConfigError(_))));

        cfg.api.domain = "us2".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            (ENV_API_KEY, "from-env"),
            (ENV_DOMAIN, "ap1"),
            (ENV_TIMEOUT_MS, "5000"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.api.api_key, "from-env");
        assert_eq!(cfg.api.domain, "ap1");
        assert_eq!(cfg.api.timeout(), Duration::from_secs(5));

        let mut bad = Config::default();
        let err = bad
            .apply_overrides(|k| (k == ENV_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, LogQueryError::ConfigError(_)));
    }

    #[test]
    fn load_yaml_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "api:\n  api_key: abc\n  domain: eu2\nquery:\n  max_limit: 40\n",
        )
        .unwrap();
        let cfg = Config::load_from_path(&path).unwrap();
        assert_eq!(cfg.api.api_key, "abc");
        assert_eq!(cfg.query.max_limit, 40);
        assert_eq!(cfg.query.min_limit, 1);
        assert_eq!(cfg.retry.max_retries, 3);
    }

    #[test]
    fn load_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"retry": {"base_delay_ms": 250}}"#).unwrap();
        let cfg = Config::load_from_path(&path).unwrap();
        assert_eq!(cfg.retry.base_delay(), Duration::from_millis(250));
        assert_eq!(cfg.api.timeout_ms, 30_000);
    }
}
