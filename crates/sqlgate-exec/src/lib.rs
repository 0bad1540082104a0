//! Cost-bounded execution
//!
//! Estimate, budget-check and execute a statement against a query engine,
//! repairing it at most once when the engine rejects it.

pub mod duck;
pub mod engine;
pub mod orchestrator;
pub mod result;

pub use duck::{DuckDbEngine, EngineError};
pub use engine::{format_gib, Budget, EngineRejection, QueryEngine, RepairError, Repairer, BYTES_PER_GIB};
pub use orchestrator::{ExecutionError, ExecutionOutcome, Orchestrator, OutcomeStatus, RepairFailure};
pub use result::QueryResult;
