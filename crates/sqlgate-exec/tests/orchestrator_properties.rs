//! Repair bound and budget precedence over arbitrary engine behavior

use proptest::prelude::*;
use sqlgate_exec::{
    Budget, DuckDbEngine, EngineRejection, ExecutionError, Orchestrator, OutcomeStatus,
    QueryEngine, RepairError,
};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// One scripted engine response per call; exhausted scripts reject
struct Scripted {
    estimates: RefCell<VecDeque<Option<u64>>>,
    executions: RefCell<VecDeque<bool>>,
    estimate_calls: Cell<usize>,
    execute_calls: Cell<usize>,
}

impl Scripted {
    fn new(estimates: Vec<Option<u64>>, executions: Vec<bool>) -> Self {
        Self {
            estimates: RefCell::new(estimates.into()),
            executions: RefCell::new(executions.into()),
            estimate_calls: Cell::new(0),
            execute_calls: Cell::new(0),
        }
    }
}

impl QueryEngine for Scripted {
    type Output = ();

    fn estimate(&self, _statement: &str) -> Result<u64, EngineRejection> {
        self.estimate_calls.set(self.estimate_calls.get() + 1);
        self.estimates
            .borrow_mut()
            .pop_front()
            .flatten()
            .ok_or_else(|| EngineRejection::new("plan rejected"))
    }

    fn execute(&self, _statement: &str) -> Result<(), EngineRejection> {
        self.execute_calls.set(self.execute_calls.get() + 1);
        match self.executions.borrow_mut().pop_front() {
            Some(true) => Ok(()),
            _ => Err(EngineRejection::new("execution rejected")),
        }
    }
}

proptest! {
    #[test]
    fn test_repair_runs_at_most_once(
        estimates in prop::collection::vec(prop::option::of(0u64..1_000), 0..4),
        executions in prop::collection::vec(any::<bool>(), 0..4),
        budget in prop::option::of(0u64..1_000),
    ) {
        let engine = Scripted::new(estimates, executions);
        let repairs = Cell::new(0);
        let repair = |stmt: &str, _: &str| -> Result<String, RepairError> {
            repairs.set(repairs.get() + 1);
            Ok(format!("{stmt} -- fixed"))
        };

        let outcome = Orchestrator::new(Budget { max_bytes: budget })
            .run("SELECT 1", &engine, &repair)
            .unwrap();

        prop_assert!(repairs.get() <= 1);
        prop_assert!(engine.estimate_calls.get() <= 2);
        prop_assert!(engine.execute_calls.get() <= 2);
        prop_assert_eq!(outcome.repaired, repairs.get() == 1);
        prop_assert_eq!(outcome.is_success(), outcome.error.is_none());
    }

    #[test]
    fn test_over_budget_never_executes(
        estimate in 1u64..u64::MAX,
        below in 0u64..1_000,
    ) {
        let budget = estimate.saturating_sub(below + 1);
        let engine = Scripted::new(vec![Some(estimate)], vec![true]);
        let repair = |_: &str, _: &str| -> Result<String, RepairError> {
            Err(RepairError::Unavailable("not expected".into()))
        };

        let outcome = Orchestrator::new(Budget::bytes(budget))
            .run("SELECT 1", &engine, &repair)
            .unwrap();

        prop_assert_eq!(engine.execute_calls.get(), 0);
        prop_assert_eq!(outcome.status(), OutcomeStatus::Blocked);
        prop_assert_eq!(
            outcome.error,
            Some(ExecutionError::BudgetExceeded { estimated_bytes: estimate, budget_bytes: budget })
        );
    }
}

#[test]
fn test_duckdb_repair_round_trip() {
    let engine = DuckDbEngine::in_memory().unwrap().with_row_cap(100);
    engine
        .connection()
        .execute_batch(
            "CREATE TABLE sales (region VARCHAR, total DOUBLE);
             INSERT INTO sales VALUES ('north', 10), ('south', 32.5), ('north', 4);",
        )
        .unwrap();

    let errors = RefCell::new(Vec::new());
    let repair = |stmt: &str, err: &str| -> Result<String, RepairError> {
        errors.borrow_mut().push(err.to_string());
        Ok(stmt.replace("totl", "total"))
    };

    let outcome = Orchestrator::new(Budget::from_gib(1.0))
        .run(
            "SELECT region, SUM(totl) AS revenue FROM memory.main.sales GROUP BY region ORDER BY region",
            &engine,
            &repair,
        )
        .unwrap();

    assert_eq!(outcome.status(), OutcomeStatus::Success);
    assert!(outcome.repaired);
    assert_eq!(errors.borrow().len(), 1);
    assert!(outcome.final_statement.contains("SUM(total)"));

    let result = outcome.result.unwrap();
    assert_eq!(result.columns, vec!["region", "revenue"]);
    assert_eq!(result.row_count, 2);
    assert_eq!(result.rows[0][0], "north");
    assert_eq!(result.rows[0][1], 14.0);
}
