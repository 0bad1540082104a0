//! sqlgate MCP Server
//!
//! Model Context Protocol server that answers questions with guarded,
//! cost-bounded SQL against DuckDB.

use std::sync::Arc;

use anyhow::Context;
use rust_mcp_sdk::mcp_server::{hyper_server, HyperServerOptions};
use sqlgate_exec::{format_gib, DuckDbEngine, Orchestrator};
use sqlgate_guard::SqlGuard;
use sqlgate_server::catalog::SchemaCache;
use sqlgate_server::config::Config;
use sqlgate_server::llm::{LlmClient, PromptContext};
use sqlgate_server::mcp::SqlGateHandler;
use sqlgate_server::metrics::Metrics;
use sqlgate_server::query::QueryService;
use sqlgate_server::logging;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets come from .env
    dotenvy::dotenv().ok();

    let config_path = std::env::var("SQLGATE_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading {config_path}"))?;
    config.apply_logging_env();
    logging::init();

    let dataset = config.default_dataset()?;
    let engine = DuckDbEngine::open(&config.engine.database, true)?.with_row_cap(config.engine.row_cap);

    let schema = SchemaCache::load(engine.connection(), &dataset, &config.schema_cache, false)
        .context("loading schema")?;
    let allowed = schema.allowed_catalog(&config.guard.allowed_tables);
    if allowed.is_empty() {
        warn!(dataset = %dataset, "No readable tables; every query will be rejected");
    }

    let prompt = PromptContext {
        allowed_tables: allowed.iter().map(ToString::to_string).collect(),
        schema_context: schema.render_context(&allowed, config.schema_cache.max_columns_per_table),
        row_cap: config.engine.row_cap,
    };
    info!(
        dataset = %dataset,
        tables = allowed.len(),
        budget = %config.budget().max_bytes.map_or_else(|| "unbounded".to_string(), format_gib),
        "Guard ready"
    );

    let metrics = Arc::new(Metrics::new()?);
    let mut service = QueryService::new(
        SqlGuard::new(allowed, dataset),
        engine,
        Orchestrator::new(config.budget()),
        metrics,
        prompt,
    )
    .with_assumptions(config.assumptions.rules.clone());
    match Config::get_openai_api_key() {
        Ok(key) => {
            info!(model = %config.llm.default_model, fallback = %config.llm.fallback_model, "OpenAI enabled");
            service = service.with_llm(LlmClient::new(key, config.llm.clone()));
        }
        Err(e) => warn!(error = %e, "Question answering and repair disabled"),
    }

    let handler = SqlGateHandler::new(Arc::new(service));
    let server_info = SqlGateHandler::server_info();

    info!(host = %config.server.host, port = config.server.port, "Starting sqlgate MCP server (SSE)");

    let server = hyper_server::create_server(
        server_info,
        handler,
        HyperServerOptions {
            host: config.server.host.clone(),
            port: config.server.port,
            sse_support: true,
            ..Default::default()
        },
    );

    server.start().await.map_err(|e| anyhow::anyhow!(e.to_string()))?;

    Ok(())
}
