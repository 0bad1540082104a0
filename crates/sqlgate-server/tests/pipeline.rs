//! Schema cache, guard and DuckDB engine wired together without a language model

use std::sync::Arc;

use sqlgate_exec::{Budget, DuckDbEngine, Orchestrator};
use sqlgate_guard::{DefaultDataset, SqlGuard};
use sqlgate_server::catalog::SchemaCache;
use sqlgate_server::config::SchemaCacheConfig;
use sqlgate_server::llm::PromptContext;
use sqlgate_server::metrics::Metrics;
use sqlgate_server::query::{QueryService, ReportStatus};

fn build(budget: Budget, allowed_tables: &[String]) -> QueryService {
    let engine = DuckDbEngine::in_memory().unwrap().with_row_cap(2);
    engine
        .connection()
        .execute_batch(
            "CREATE TABLE sales (day DATE, region VARCHAR, amount DOUBLE);
             INSERT INTO sales VALUES
               ('2024-01-01', 'east', 10), ('2024-01-01', 'west', 4),
               ('2024-01-02', 'east', 7), ('2024-01-02', 'north', 1);
             CREATE TABLE payroll (name VARCHAR, salary DOUBLE);",
        )
        .unwrap();

    let dataset = DefaultDataset::new("memory", "main");
    let cache = SchemaCacheConfig {
        path: std::env::temp_dir()
            .join(format!("sqlgate-pipeline-{}.json", uuid::Uuid::new_v4()))
            .display()
            .to_string(),
        ..Default::default()
    };
    let schema = SchemaCache::load(engine.connection(), &dataset, &cache, true).unwrap();
    std::fs::remove_file(&cache.path).ok();

    let allowed = schema.allowed_catalog(allowed_tables);
    let prompt = PromptContext {
        allowed_tables: allowed.iter().map(ToString::to_string).collect(),
        schema_context: schema.render_context(&allowed, 10),
        row_cap: 2,
    };

    QueryService::new(
        SqlGuard::new(allowed, dataset),
        engine,
        Orchestrator::new(budget),
        Arc::new(Metrics::new().unwrap()),
        prompt,
    )
}

#[tokio::test]
async fn test_partial_reference_runs_and_truncates() {
    let service = build(Budget::unbounded(), &["sales".to_string()]);

    let report = service
        .run_sql("SELECT region, SUM(amount) AS total FROM main.sales GROUP BY region ORDER BY region")
        .await
        .unwrap();

    assert_eq!(report.status, ReportStatus::Success);
    assert_eq!(
        report.verdict.diagnostics.table_refs_normalized,
        vec!["memory.main.sales"]
    );
    let result = report.result.unwrap();
    assert_eq!(result.columns, vec!["region", "total"]);
    assert_eq!(result.row_count, 2);
    assert!(result.truncated);
}

#[tokio::test]
async fn test_restricted_allowlist_rejects_other_tables() {
    let service = build(Budget::unbounded(), &["sales".to_string()]);
    assert_eq!(service.prompt().allowed_tables, vec!["memory.main.sales"]);
    assert!(!service.prompt().schema_context.contains("payroll"));

    let report = service
        .run_sql("SELECT s.amount FROM memory.main.sales s, memory.main.payroll p")
        .await
        .unwrap();
    assert_eq!(report.status, ReportStatus::Rejected);
    assert_eq!(
        report.verdict.diagnostics.rejected_refs,
        vec!["memory.main.payroll"]
    );
}

#[tokio::test]
async fn test_restricted_allowlist_rejects_unqualified_table() {
    let service = build(Budget::unbounded(), &["sales".to_string()]);

    for sql in [
        "SELECT * FROM payroll",
        "SELECT * FROM memory . main . payroll",
        "SELECT * FROM memory./* x */main.payroll",
        "SELECT s.amount FROM sales s JOIN payroll p ON true",
    ] {
        let report = service.run_sql(sql).await.unwrap();
        assert_eq!(report.status, ReportStatus::Rejected, "{sql}");
        assert_eq!(
            report.verdict.diagnostics.rejected_refs,
            vec!["memory.main.payroll"],
            "{sql}"
        );
        assert!(report.result.is_none());
    }
}

#[tokio::test]
async fn test_restricted_allowlist_rejects_table_functions_and_files() {
    let service = build(Budget::unbounded(), &["sales".to_string()]);

    for sql in [
        "SELECT * FROM read_text('/etc/passwd')",
        "SELECT * FROM '/etc/passwd'",
        "SELECT * FROM read_csv ('/etc/hosts')",
        "SELECT s.region FROM sales s JOIN query_table('payroll') q ON true",
    ] {
        let report = service.run_sql(sql).await.unwrap();
        assert_eq!(report.status, ReportStatus::Rejected, "{sql}");
        assert!(!report.verdict.diagnostics.unresolved_refs.is_empty(), "{sql}");
        assert!(report.final_sql.is_none());
    }

    let report = service
        .run_sql("SELECT g FROM range(3) t(g)")
        .await
        .unwrap();
    assert_eq!(report.status, ReportStatus::Success);
}

#[tokio::test]
async fn test_engine_error_without_repairer_fails() {
    let service = build(Budget::unbounded(), &[]);

    let report = service
        .run_sql("SELECT amount_usd FROM memory.main.sales")
        .await
        .unwrap();

    assert_eq!(report.status, ReportStatus::Failed);
    assert!(!report.repaired);
    assert!(report.repair_attempted);
    assert!(report.error.unwrap().contains("no language model configured"));

    let text = service.metrics().render().unwrap();
    assert!(text.contains("sqlgate_repairs_total 1"));
}

#[tokio::test]
async fn test_budget_block_and_metrics() {
    let service = build(Budget::bytes(1), &[]);

    let report = service.run_sql("SELECT * FROM memory.main.sales").await.unwrap();
    assert_eq!(report.status, ReportStatus::Blocked);
    assert!(report.estimated_bytes.unwrap() > 1);

    service.check_sql("DELETE FROM memory.main.sales");
    let text = service.metrics().render().unwrap();
    assert!(text.contains("sqlgate_executions_total{status=\"blocked\"} 1"));
    assert!(text.contains("sqlgate_guard_checks_total{verdict=\"reject\"} 1"));
}
