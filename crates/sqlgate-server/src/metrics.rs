//! Prometheus counters for guard verdicts and execution outcomes

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use sqlgate_exec::{OutcomeStatus, BYTES_PER_GIB};
use sqlgate_guard::{GuardVerdict, Violation};

pub struct Metrics {
    registry: Registry,
    guard_checks: IntCounterVec,
    guard_rejections: IntCounterVec,
    executions: IntCounterVec,
    repairs: IntCounter,
    scan_gib: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let guard_checks = IntCounterVec::new(
            Opts::new("sqlgate_guard_checks_total", "Guard checks by verdict"),
            &["verdict"],
        )?;
        let guard_rejections = IntCounterVec::new(
            Opts::new("sqlgate_guard_rejections_total", "Guard rejections by reason"),
            &["reason"],
        )?;
        let executions = IntCounterVec::new(
            Opts::new("sqlgate_executions_total", "Orchestrator runs by final status"),
            &["status"],
        )?;
        let repairs = IntCounter::with_opts(Opts::new(
            "sqlgate_repairs_total",
            "Statements sent to the repair collaborator",
        ))?;
        let scan_gib = Histogram::with_opts(
            HistogramOpts::new("sqlgate_estimated_scan_gib", "Estimated scan per run in GiB")
                .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 50.0]),
        )?;

        registry.register(Box::new(guard_checks.clone()))?;
        registry.register(Box::new(guard_rejections.clone()))?;
        registry.register(Box::new(executions.clone()))?;
        registry.register(Box::new(repairs.clone()))?;
        registry.register(Box::new(scan_gib.clone()))?;

        Ok(Self {
            registry,
            guard_checks,
            guard_rejections,
            executions,
            repairs,
            scan_gib,
        })
    }

    pub fn record_verdict(&self, verdict: &GuardVerdict) {
        let label = if verdict.ok { "pass" } else { "reject" };
        self.guard_checks.with_label_values(&[label]).inc();

        for violation in &verdict.violations {
            self.guard_rejections
                .with_label_values(&[violation_label(violation)])
                .inc();
        }
    }

    pub fn record_outcome(&self, status: OutcomeStatus, repair_attempted: bool, estimated_bytes: Option<u64>) {
        let label = match status {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Blocked => "blocked",
            OutcomeStatus::Failed => "failed",
        };
        self.executions.with_label_values(&[label]).inc();

        if repair_attempted {
            self.repairs.inc();
        }
        if let Some(bytes) = estimated_bytes {
            self.scan_gib.observe(bytes as f64 / BYTES_PER_GIB as f64);
        }
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn violation_label(violation: &Violation) -> &'static str {
    match violation {
        Violation::EmptyInput => "empty_input",
        Violation::MultipleStatements => "multiple_statements",
        Violation::NotReadOnly(_) => "not_read_only",
        Violation::DisallowedKeywords(_) => "disallowed_keywords",
        Violation::UnresolvableReferences(_) => "unresolvable_references",
        Violation::OutsideAllowlist(_) => "outside_allowlist",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgate_guard::{AllowedCatalog, DefaultDataset, SqlGuard};

    #[test]
    fn test_render_counts() {
        let metrics = Metrics::new().unwrap();
        let defaults = DefaultDataset::new("demo", "main");
        let guard = SqlGuard::new(AllowedCatalog::for_dataset(&defaults, ["orders"]), defaults);

        metrics.record_verdict(&guard.check("SELECT * FROM main.orders"));
        metrics.record_verdict(&guard.check("DROP TABLE main.orders"));
        metrics.record_outcome(OutcomeStatus::Success, true, Some(BYTES_PER_GIB));

        let text = metrics.render().unwrap();
        assert!(text.contains("sqlgate_guard_checks_total{verdict=\"pass\"} 1"));
        assert!(text.contains("sqlgate_guard_rejections_total{reason=\"not_read_only\"} 1"));
        assert!(text.contains("sqlgate_executions_total{status=\"success\"} 1"));
        assert!(text.contains("sqlgate_repairs_total 1"));
    }
}
