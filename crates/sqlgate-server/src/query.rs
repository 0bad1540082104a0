//! Question to rows: generate, guard, then estimate/budget/execute with one repair

use std::sync::{Arc, Mutex};

use serde::Serialize;
use sqlgate_exec::{
    format_gib, DuckDbEngine, EngineError, ExecutionOutcome, Orchestrator, OutcomeStatus,
    QueryResult, RepairError, RepairFailure, Repairer,
};
use sqlgate_guard::{GuardVerdict, SqlGuard};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::assumptions::{self, AssumptionRule};
use crate::llm::{LlmClient, LlmError, PromptContext};
use crate::metrics::Metrics;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Language model is not configured (set OPENAI_API_KEY)")]
    LlmUnavailable,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Engine connection lock poisoned")]
    EnginePoisoned,

    #[error("Query task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// The guard refused the statement; nothing reached the engine
    Rejected,
    Success,
    Blocked,
    Failed,
}

impl From<OutcomeStatus> for ReportStatus {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Success => ReportStatus::Success,
            OutcomeStatus::Blocked => ReportStatus::Blocked,
            OutcomeStatus::Failed => ReportStatus::Failed,
        }
    }
}

/// Everything the caller needs to display one request
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub question: Option<String>,
    pub model: Option<String>,
    pub sql: String,
    pub verdict: GuardVerdict,
    pub final_sql: Option<String>,
    pub estimated_bytes: Option<u64>,
    pub estimated_gb: Option<String>,
    /// True once a repaired statement replaced the original
    pub repaired: bool,
    /// True whenever the repair collaborator was asked, even if it failed
    pub repair_attempted: bool,
    pub status: ReportStatus,
    pub error: Option<String>,
    pub result: Option<QueryResult>,
    /// How ambiguous terms in the question were read
    pub assumptions: Vec<String>,
}

impl QueryReport {
    fn new(question: Option<&str>, model: Option<&str>, sql: &str, verdict: GuardVerdict) -> Self {
        let status = if verdict.ok {
            ReportStatus::Failed
        } else {
            ReportStatus::Rejected
        };
        let error = (!verdict.ok).then(|| verdict.reasons.join("; "));
        Self {
            question: question.map(str::to_string),
            model: model.map(str::to_string),
            sql: sql.to_string(),
            verdict,
            final_sql: None,
            estimated_bytes: None,
            estimated_gb: None,
            repaired: false,
            repair_attempted: false,
            status,
            error,
            result: None,
            assumptions: Vec::new(),
        }
    }

    fn with_outcome(mut self, outcome: ExecutionOutcome<QueryResult>) -> Self {
        self.status = outcome.status().into();
        self.estimated_gb = outcome.estimated_bytes.map(format_gib);
        self.estimated_bytes = outcome.estimated_bytes;
        self.repaired = outcome.repaired;
        self.repair_attempted = outcome.repaired;
        self.error = outcome.error.map(|e| e.to_string());
        self.result = outcome.result;
        self.final_sql = Some(outcome.final_statement);
        self
    }

    fn with_repair_failure(mut self, failure: RepairFailure) -> Self {
        self.status = ReportStatus::Failed;
        self.estimated_gb = failure.estimated_bytes.map(format_gib);
        self.estimated_bytes = failure.estimated_bytes;
        self.repair_attempted = true;
        self.error = Some(failure.to_string());
        self.final_sql = Some(failure.statement);
        self
    }
}

/// Repair collaborator whose candidates must pass the guard again
pub struct GuardedRepair<F> {
    guard: SqlGuard,
    fix: F,
}

impl<F> GuardedRepair<F> {
    pub fn new(guard: SqlGuard, fix: F) -> Self {
        Self { guard, fix }
    }
}

impl<F> Repairer for GuardedRepair<F>
where
    F: Fn(&str, &str) -> Result<String, RepairError>,
{
    fn repair(&self, statement: &str, error: &str) -> Result<String, RepairError> {
        let candidate = (self.fix)(statement, error)?;
        let verdict = self.guard.check(&candidate);
        if !verdict.ok {
            warn!(reasons = ?verdict.reasons, "Repaired statement failed the guard");
            return Err(RepairError::Unusable(verdict.reasons.join("; ")));
        }
        Ok(verdict.cleaned_statement)
    }
}

/// Shared request pipeline behind every tool
pub struct QueryService {
    guard: SqlGuard,
    engine: Mutex<DuckDbEngine>,
    orchestrator: Orchestrator,
    metrics: Arc<Metrics>,
    llm: Option<Arc<LlmClient>>,
    prompt: PromptContext,
    assumptions: Vec<AssumptionRule>,
}

impl QueryService {
    pub fn new(
        guard: SqlGuard,
        engine: DuckDbEngine,
        orchestrator: Orchestrator,
        metrics: Arc<Metrics>,
        prompt: PromptContext,
    ) -> Self {
        Self {
            guard,
            engine: Mutex::new(engine),
            orchestrator,
            metrics,
            llm: None,
            prompt,
            assumptions: Vec::new(),
        }
    }

    pub fn with_llm(mut self, llm: LlmClient) -> Self {
        self.llm = Some(Arc::new(llm));
        self
    }

    /// Rules that document how `answer` reads ambiguous questions
    pub fn with_assumptions(mut self, rules: Vec<AssumptionRule>) -> Self {
        self.assumptions = rules;
        self
    }

    pub fn guard(&self) -> &SqlGuard {
        &self.guard
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn prompt(&self) -> &PromptContext {
        &self.prompt
    }

    pub fn check_sql(&self, sql: &str) -> GuardVerdict {
        let verdict = self.guard.check(sql);
        self.metrics.record_verdict(&verdict);
        verdict
    }

    /// Answer a natural-language question end to end
    pub async fn answer(&self, question: &str) -> Result<QueryReport, QueryError> {
        let llm = self.llm.as_ref().ok_or(QueryError::LlmUnavailable)?;
        let generated = llm.generate_sql(question, &self.prompt).await?;

        let fix = self.llm_fix(Arc::clone(llm), question);
        let report = self
            .run_guarded(Some(question), Some(&generated.model), &generated.sql, fix)
            .await?;
        Ok(QueryReport {
            assumptions: assumptions::infer(question, &self.assumptions),
            ..report
        })
    }

    /// Run caller-supplied SQL; repairs go to the model when one is configured
    pub async fn run_sql(&self, sql: &str) -> Result<QueryReport, QueryError> {
        match &self.llm {
            Some(llm) => {
                let fix = self.llm_fix(Arc::clone(llm), "Run the given SQL");
                self.run_guarded(None, None, sql, fix).await
            }
            None => self.run_guarded(None, None, sql, no_repair).await,
        }
    }

    fn llm_fix(
        &self,
        llm: Arc<LlmClient>,
        question: &str,
    ) -> impl Fn(&str, &str) -> Result<String, RepairError> + Send + 'static {
        let handle = Handle::current();
        let question = question.to_string();
        let context = self.prompt.clone();
        move |statement: &str, error: &str| {
            handle
                .block_on(llm.fix_sql(&question, statement, error, &context))
                .map_err(RepairError::from)
        }
    }

    /// Guard a statement and, if it passes, drive it through the orchestrator
    /// on a blocking thread
    pub async fn run_guarded<F>(
        &self,
        question: Option<&str>,
        model: Option<&str>,
        sql: &str,
        fix: F,
    ) -> Result<QueryReport, QueryError>
    where
        F: Fn(&str, &str) -> Result<String, RepairError> + Send + 'static,
    {
        let verdict = self.check_sql(sql);
        let statement = verdict.cleaned_statement.clone();
        let report = QueryReport::new(question, model, sql, verdict);
        if report.status == ReportStatus::Rejected {
            warn!(reasons = ?report.verdict.reasons, "Guard rejected statement");
            return Ok(report);
        }

        let engine = self
            .engine
            .lock()
            .map_err(|_| QueryError::EnginePoisoned)?
            .try_clone()?;
        let repairer = GuardedRepair::new(self.guard.clone(), fix);
        let orchestrator = self.orchestrator;

        let run = tokio::task::spawn_blocking(move || orchestrator.run(statement, &engine, &repairer))
            .await?;

        let report = match run {
            Ok(outcome) => {
                self.metrics
                    .record_outcome(outcome.status(), outcome.repaired, outcome.estimated_bytes);
                report.with_outcome(outcome)
            }
            Err(failure) => {
                warn!(error = %failure, rejection = %failure.rejection, "Repair failed");
                self.metrics
                    .record_outcome(OutcomeStatus::Failed, true, failure.estimated_bytes);
                report.with_repair_failure(failure)
            }
        };

        info!(
            status = ?report.status,
            repaired = report.repaired,
            estimated_gb = report.estimated_gb.as_deref().unwrap_or("n/a"),
            "Query finished"
        );
        Ok(report)
    }
}

fn no_repair(_statement: &str, error: &str) -> Result<String, RepairError> {
    Err(RepairError::Unavailable(format!(
        "no language model configured to repair: {error}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgate_exec::Budget;
    use sqlgate_guard::{AllowedCatalog, DefaultDataset};

    fn service(budget: Budget) -> QueryService {
        let engine = DuckDbEngine::in_memory().unwrap().with_row_cap(10);
        engine
            .connection()
            .execute_batch(
                "CREATE TABLE orders (id INTEGER, region VARCHAR, total DOUBLE);
                 INSERT INTO orders VALUES (1, 'east', 10.0), (2, 'west', 5.5), (3, 'east', 2.5);
                 CREATE TABLE secrets (k VARCHAR);",
            )
            .unwrap();

        let defaults = DefaultDataset::new("memory", "main");
        let guard = SqlGuard::new(AllowedCatalog::for_dataset(&defaults, ["orders"]), defaults);
        QueryService::new(
            guard,
            engine,
            Orchestrator::new(budget),
            Arc::new(Metrics::new().unwrap()),
            PromptContext::default(),
        )
    }

    #[tokio::test]
    async fn test_run_guarded_success() {
        let service = service(Budget::unbounded());
        let report = service
            .run_guarded(None, None, "SELECT SUM(total) AS s FROM memory.main.orders;", no_repair)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Success);
        assert!(!report.repaired);
        assert_eq!(report.final_sql.as_deref(), Some("SELECT SUM(total) AS s FROM memory.main.orders"));
        assert_eq!(report.result.unwrap().rows, vec![vec![serde_json::json!(18.0)]]);
    }

    #[tokio::test]
    async fn test_guard_rejection_never_reaches_engine() {
        let service = service(Budget::unbounded());
        let report = service
            .run_guarded(None, None, "SELECT * FROM memory.main.secrets", no_repair)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Rejected);
        assert!(report.final_sql.is_none());
        assert!(report.error.unwrap().contains("outside allowlist"));
    }

    #[tokio::test]
    async fn test_repair_is_guarded_again() {
        let service = service(Budget::unbounded());
        let fix = |_: &str, _: &str| -> Result<String, RepairError> {
            Ok("SELECT k FROM memory.main.secrets".to_string())
        };
        let report = service
            .run_guarded(None, None, "SELECT totl FROM memory.main.orders", fix)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Failed);
        assert!(report.repair_attempted);
        assert!(!report.repaired);
        assert!(report.error.unwrap().contains("unusable"));
    }

    #[tokio::test]
    async fn test_failed_repair_keeps_estimate_and_is_counted() {
        let service = service(Budget::unbounded());
        let fix = |_: &str, _: &str| -> Result<String, RepairError> {
            Ok("SELECT k FROM memory.main.secrets".to_string())
        };
        // Plans fine, fails while casting 'east' at execution time
        let report = service
            .run_guarded(None, None, "SELECT CAST(region AS INTEGER) AS r FROM memory.main.orders", fix)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Failed);
        assert!(report.repair_attempted);
        assert!(report.estimated_bytes.is_some());
        assert!(report.estimated_gb.is_some());
        assert_eq!(
            report.final_sql.as_deref(),
            Some("SELECT CAST(region AS INTEGER) AS r FROM memory.main.orders")
        );

        let text = service.metrics().render().unwrap();
        assert!(text.contains("sqlgate_repairs_total 1"));
        assert!(text.contains("sqlgate_executions_total{status=\"failed\"} 1"));
    }

    #[tokio::test]
    async fn test_repair_then_success() {
        let service = service(Budget::unbounded());
        let fix = |statement: &str, _: &str| -> Result<String, RepairError> {
            Ok(statement.replace("totl", "total"))
        };
        let report = service
            .run_guarded(None, None, "SELECT MAX(totl) AS m FROM memory.main.orders", fix)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Success);
        assert!(report.repaired);
        assert_eq!(report.final_sql.as_deref(), Some("SELECT MAX(total) AS m FROM memory.main.orders"));
    }

    #[tokio::test]
    async fn test_zero_budget_blocks_table_scan() {
        let service = service(Budget::bytes(0));
        let report = service
            .run_guarded(None, None, "SELECT * FROM memory.main.orders", no_repair)
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Blocked);
        assert!(report.result.is_none());
        assert!(report.error.unwrap().starts_with("Blocked: scan"));
    }

    #[tokio::test]
    async fn test_answer_without_llm() {
        let service = service(Budget::unbounded());
        assert!(matches!(
            service.answer("total sales?").await,
            Err(QueryError::LlmUnavailable)
        ));
    }
}
