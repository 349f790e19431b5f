use std::time::Instant;

use serde_json::Value;
use tracing::info;

use crate::config::Config;
use crate::context::QueryContext;
use crate::error::Result;
use crate::executor::{QueryExecutor, RemoteQueryRequest, RemoteQueryResponse};
use crate::model::{LogAnalysis, QueryResult, SearchRequest};
use crate::normalizer::{build_query_result, summarize_logs};
use crate::schema::logs_schema;

/// Search service: orchestrates context building, remote execution and normalization.
pub struct LogSearchService {
    config: Config,
    executor: QueryExecutor,
}

impl LogSearchService {
    pub fn new(config: Config) -> Result<Self> {
        let executor = QueryExecutor::new(&config.api, &config.retry)?;
        Ok(Self { config, executor })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn query_logs(&self, request: SearchRequest) -> Result<QueryResult> {
        let started = Instant::now();
        let (ctx, response) = self.fetch_page(&request).await?;
        let mut result = build_query_result(
            &response.logs,
            &ctx,
            ctx.page,
            response.total,
            &self.config.normalizer,
        );
        result.query_id = response.query_id;

        info!(
            dialect = ctx.dialect.as_str(),
            page = ctx.page,
            shown = result.summary.results_shown,
            has_next_page = result.summary.has_next_page,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query_logs completed"
        );
        Ok(result)
    }

    /// Same retrieval as `query_logs`, reduced to aggregate counts.
    pub async fn analyze_logs(&self, request: SearchRequest) -> Result<LogAnalysis> {
        let (ctx, response) = self.fetch_page(&request).await?;
        let result = build_query_result(
            &response.logs,
            &ctx,
            ctx.page,
            response.total,
            &self.config.normalizer,
        );

        Ok(LogAnalysis {
            analysis: summarize_logs(&result.logs),
            summary: result.summary,
        })
    }

    pub fn schema(&self, include_examples: bool, include_advanced: bool) -> Value {
        logs_schema(include_examples, include_advanced)
    }

    pub async fn test_connection(&self) -> bool {
        self.executor.test_connection().await
    }

    /// Runs the remote query and keeps only the rows of the requested page.
    async fn fetch_page(
        &self,
        request: &SearchRequest,
    ) -> Result<(QueryContext, RemoteQueryResponse)> {
        let ctx = QueryContext::build(request, &self.config.query)?;
        let remote = RemoteQueryRequest::from_context(&ctx);
        let mut response = self.executor.execute(&remote).await?;
        response.logs = response
            .logs
            .into_iter()
            .skip(ctx.offset as usize)
            .take(ctx.limit as usize)
            .collect();
        Ok((ctx, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogQueryError;

    fn service() -> LogSearchService {
        let mut cfg = Config::default();
        cfg.api.api_key = "k".into();
        cfg.api.base_url = Some("http://127.0.0.1:9".into());
        cfg.retry.max_retries = 0;
        LogSearchService::new(cfg).unwrap()
    }

    #[tokio::test]
    async fn invalid_input_fails_before_any_request() {
        let svc = service();
        let err = svc
            .query_logs(SearchRequest {
                query: "".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LogQueryError::InvalidInput(_)));

        let err = svc
            .query_logs(SearchRequest {
                query: "x".into(),
                page: Some(99),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LogQueryError::PageOutOfRange { .. }));
    }

    #[test]
    fn schema_is_served_without_remote() {
        let svc = service();
        let schema = svc.schema(true, false);
        assert!(schema.get("fields").is_some());
        assert!(schema.get("examples").is_some());
    }
}
