//! MCP (Model Context Protocol) server implementation

use async_trait::async_trait;
use rust_mcp_schema::{
    schema_utils::CallToolError, CallToolRequest, CallToolResult, ContentBlock, Implementation,
    InitializeResult, ListToolsRequest, ListToolsResult, RpcError, ServerCapabilities,
    ServerCapabilitiesTools, TextContent, Tool, ToolInputSchema, LATEST_PROTOCOL_VERSION,
};
use rust_mcp_sdk::{mcp_server::ServerHandler, McpServer};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::log_event;
use crate::query::{QueryService, ReportStatus};

type Arguments = Option<Map<String, Value>>;

/// sqlgate MCP Server Handler
pub struct SqlGateHandler {
    service: Arc<QueryService>,
}

impl SqlGateHandler {
    pub fn new(service: Arc<QueryService>) -> Self {
        Self { service }
    }

    /// Create server initialization details
    pub fn server_info() -> InitializeResult {
        InitializeResult {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "sqlgate-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("sqlgate: guarded, cost-bounded SQL".to_string()),
            },
            instructions: Some(
                "sqlgate answers questions with read-only SQL. Every statement is checked \
                 against a table allowlist and a scan budget before it runs. Use 'query' for \
                 questions, 'run_sql' or 'check_sql' for your own SQL, and 'catalog' to see \
                 which tables are allowed."
                    .to_string(),
            ),
            meta: None,
        }
    }

    /// Define available MCP tools
    fn tools() -> Vec<Tool> {
        let tool = |name: &str, description: &str, arg: Option<(&str, &str)>| {
            let mut properties = HashMap::new();
            let mut required = Vec::new();
            if let Some((arg_name, arg_description)) = arg {
                let mut prop = Map::new();
                prop.insert("type".to_string(), Value::String("string".to_string()));
                prop.insert(
                    "description".to_string(),
                    Value::String(arg_description.to_string()),
                );
                properties.insert(arg_name.to_string(), prop);
                required.push(arg_name.to_string());
            }

            Tool {
                name: name.to_string(),
                description: Some(description.to_string()),
                input_schema: ToolInputSchema::new(required, Some(properties)),
                title: None,
                annotations: None,
                meta: None,
                output_schema: None,
            }
        };

        vec![
            tool(
                "query",
                "Answer a natural language question. The question is turned into SQL, checked \
                 by the guard, estimated against the scan budget and executed, with at most \
                 one automatic repair. Returns the SQL, guard diagnostics, the estimate and rows.",
                Some(("question", "Question about the data (e.g., 'total revenue by region')")),
            ),
            tool(
                "run_sql",
                "Run a read-only SQL statement through the guard and the scan budget.",
                Some(("sql", "A single SELECT or WITH statement")),
            ),
            tool(
                "check_sql",
                "Check a SQL statement with the guard only. Nothing is executed.",
                Some(("sql", "SQL text to check")),
            ),
            tool(
                "catalog",
                "List the allowed tables and their columns.",
                None,
            ),
            tool(
                "metrics",
                "Prometheus text exposition of guard and execution counters.",
                None,
            ),
        ]
    }

    async fn dispatch(&self, name: &str, arguments: Arguments) -> Result<CallToolResult, CallToolError> {
        match name {
            "query" => self.handle_query_tool(arguments).await,
            "run_sql" => self.handle_run_sql_tool(arguments).await,
            "check_sql" => self.handle_check_sql_tool(arguments),
            "catalog" => self.handle_catalog_tool(),
            "metrics" => self.handle_metrics_tool(),
            _ => Err(CallToolError::unknown_tool(name.to_string())),
        }
    }

    async fn handle_query_tool(&self, arguments: Arguments) -> Result<CallToolResult, CallToolError> {
        let question = required_str(&arguments, "question")?;
        info!(question = %question, "Answering question");

        let report = self.service.answer(&question).await.map_err(|e| {
            error!(error = %e, "Query failed");
            CallToolError::from_message(format!("Query failed: {e}"))
        })?;

        log_event!(
            level: tracing::Level::INFO,
            event: "query_answered",
            status: report.status,
            repaired: report.repaired,
            repair_attempted: report.repair_attempted,
            assumptions: report.assumptions.len(),
            estimated_bytes: report.estimated_bytes
        );
        json_result(&report, report.status != ReportStatus::Success)
    }

    async fn handle_run_sql_tool(&self, arguments: Arguments) -> Result<CallToolResult, CallToolError> {
        let sql = required_str(&arguments, "sql")?;

        let report = self.service.run_sql(&sql).await.map_err(|e| {
            error!(error = %e, "SQL run failed");
            CallToolError::from_message(format!("SQL run failed: {e}"))
        })?;

        json_result(&report, report.status != ReportStatus::Success)
    }

    fn handle_check_sql_tool(&self, arguments: Arguments) -> Result<CallToolResult, CallToolError> {
        let sql = required_str(&arguments, "sql")?;
        let verdict = self.service.check_sql(&sql);
        json_result(&verdict, !verdict.ok)
    }

    fn handle_catalog_tool(&self) -> Result<CallToolResult, CallToolError> {
        let prompt = self.service.prompt();
        let summary = format!(
            "Allowed tables ({}):\n{}\n\n{}",
            prompt.allowed_tables.len(),
            prompt.allowed_tables.join("\n"),
            prompt.schema_context
        );
        Ok(text_result(summary, false))
    }

    fn handle_metrics_tool(&self) -> Result<CallToolResult, CallToolError> {
        let text = self.service.metrics().render().map_err(|e| {
            error!(error = %e, "Failed to render metrics");
            CallToolError::from_message(format!("Failed to render metrics: {e}"))
        })?;
        Ok(text_result(text, false))
    }
}

#[async_trait]
impl ServerHandler for SqlGateHandler {
    async fn handle_list_tools_request(
        &self,
        _request: ListToolsRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<ListToolsResult, RpcError> {
        info!("Listing available tools");

        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn handle_call_tool_request(
        &self,
        request: CallToolRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        let name = request.params.name;
        let span = info_span!("tool_call", request_id = %Uuid::new_v4(), tool = %name);

        async {
            info!("Tool called");
            self.dispatch(&name, request.params.arguments).await
        }
        .instrument(span)
        .await
    }
}

fn required_str(arguments: &Arguments, key: &str) -> Result<String, CallToolError> {
    let args = arguments
        .as_ref()
        .ok_or_else(|| CallToolError::from_message("Missing arguments"))?;

    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CallToolError::from_message(format!("Missing required argument: {key}")))
}

fn text_result(text: String, is_error: bool) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::TextContent(TextContent::new(text, None, None))],
        is_error: is_error.then_some(true),
        meta: None,
        structured_content: None,
    }
}

fn json_result<T: Serialize>(value: &T, is_error: bool) -> Result<CallToolResult, CallToolError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        error!(error = %e, "Failed to serialize tool result");
        CallToolError::from_message(format!("Failed to serialize result: {e}"))
    })?;
    Ok(text_result(text, is_error))
}
