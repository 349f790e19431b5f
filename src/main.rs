use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use log_query_mcp::config::Config;
use log_query_mcp::mcp::run_stdio;
use log_query_mcp::search::LogSearchService;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout 承载 JSON-RPC，日志只能写 stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => {
            let mut config = Config::load_from_path(Path::new(path))
                .with_context(|| format!("failed to load config from {path}"))?;
            config
                .apply_env_overrides()
                .context("invalid environment configuration")?;
            config
        }
        None => Config::from_env().context("invalid environment configuration")?,
    };
    config.validate().context("invalid configuration")?;

    let service = Arc::new(LogSearchService::new(config).context("failed to build service")?);
    info!(
        domain = %service.config().api.domain,
        "log query MCP server starting on stdio"
    );
    let probe = service.clone();
    tokio::spawn(async move {
        if !probe.test_connection().await {
            warn!("remote log API is not reachable yet; queries will retry on demand");
        }
    });

    run_stdio(service).await?;
    Ok(())
}
