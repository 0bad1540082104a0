//! Estimate, budget-check and execute with at most one repair
//!
//! The run is a loop over a tagged [`State`]. Entering `Repairing` is only
//! possible while `repaired` is false, and leaving it sets the flag, so a
//! second repair cannot be expressed.

use crate::engine::{format_gib, Budget, EngineRejection, QueryEngine, RepairError, Repairer};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Terminal error carried in an [`ExecutionOutcome`]
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    /// The engine's message, verbatim
    #[error("{message}")]
    Rejected { statement: String, message: String },

    #[error(
        "Blocked: scan {} exceeds max allowed {}.",
        format_gib(*estimated_bytes),
        format_gib(*budget_bytes)
    )]
    BudgetExceeded {
        estimated_bytes: u64,
        budget_bytes: u64,
    },
}

/// A run cut short because the repair collaborator failed.
///
/// Carries the state the run had reached so callers can still report it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source}")]
pub struct RepairFailure {
    pub source: RepairError,
    /// Statement that was sent for repair
    pub statement: String,
    /// Engine message that triggered the repair
    pub rejection: String,
    /// Last successful estimate; `None` when no estimate succeeded
    pub estimated_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Blocked,
    Failed,
}

/// The final attempt of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome<T> {
    pub final_statement: String,
    /// Last successful estimate; `None` when no estimate succeeded
    pub estimated_bytes: Option<u64>,
    pub result: Option<T>,
    pub repaired: bool,
    pub error: Option<ExecutionError>,
}

impl<T> ExecutionOutcome<T> {
    pub fn status(&self) -> OutcomeStatus {
        match (&self.result, &self.error) {
            (Some(_), _) => OutcomeStatus::Success,
            (None, Some(ExecutionError::BudgetExceeded { .. })) => OutcomeStatus::Blocked,
            (None, _) => OutcomeStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == OutcomeStatus::Success
    }
}

enum State<T> {
    Estimating { statement: String },
    BudgetCheck { statement: String, estimated: u64 },
    Executing { statement: String },
    Repairing { statement: String, error: String },
    Done(ExecutionOutcome<T>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Orchestrator {
    budget: Budget,
}

impl Orchestrator {
    pub fn new(budget: Budget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// Drive one statement to a terminal outcome.
    ///
    /// Engine rejections and budget blocks are returned as data in the
    /// outcome. Only a failing repair collaborator is an `Err`, and it keeps
    /// the statement and estimate reached so far.
    pub fn run<E, R>(
        &self,
        statement: impl Into<String>,
        engine: &E,
        repairer: &R,
    ) -> Result<ExecutionOutcome<E::Output>, RepairFailure>
    where
        E: QueryEngine + ?Sized,
        R: Repairer + ?Sized,
    {
        let mut repaired = false;
        let mut estimated: Option<u64> = None;
        let mut state = State::Estimating {
            statement: statement.into(),
        };

        let finish = |statement: String,
                      estimated: Option<u64>,
                      repaired: bool,
                      result: Option<E::Output>,
                      error: Option<ExecutionError>| {
            State::Done(ExecutionOutcome {
                final_statement: statement,
                estimated_bytes: estimated,
                result,
                repaired,
                error,
            })
        };

        loop {
            state = match state {
                State::Estimating { statement } => match engine.estimate(&statement) {
                    Ok(bytes) => {
                        debug!(bytes, repaired, "Estimated scan");
                        estimated = Some(bytes);
                        State::BudgetCheck {
                            statement,
                            estimated: bytes,
                        }
                    }
                    Err(rejection) => {
                        warn!(error = %rejection, repaired, "Engine rejected statement at estimate");
                        self.on_rejection(statement, rejection, repaired, |statement, error| {
                            finish(statement, estimated, repaired, None, Some(error))
                        })
                    }
                },

                State::BudgetCheck {
                    statement,
                    estimated: bytes,
                } => match self.budget.max_bytes {
                    Some(max) if bytes > max => {
                        warn!(
                            estimated = %format_gib(bytes),
                            budget = %format_gib(max),
                            "Scan exceeds budget, not executing"
                        );
                        let error = ExecutionError::BudgetExceeded {
                            estimated_bytes: bytes,
                            budget_bytes: max,
                        };
                        finish(statement, estimated, repaired, None, Some(error))
                    }
                    _ => State::Executing { statement },
                },

                State::Executing { statement } => match engine.execute(&statement) {
                    Ok(result) => {
                        info!(repaired, "Statement executed");
                        finish(statement, estimated, repaired, Some(result), None)
                    }
                    Err(rejection) => {
                        warn!(error = %rejection, repaired, "Engine rejected statement at execute");
                        self.on_rejection(statement, rejection, repaired, |statement, error| {
                            finish(statement, estimated, repaired, None, Some(error))
                        })
                    }
                },

                State::Repairing { statement, error } => {
                    info!("Repairing rejected statement");
                    let fixed = match repairer.repair(&statement, &error) {
                        Ok(fixed) => fixed,
                        Err(source) => {
                            warn!(error = %source, "Repair collaborator failed");
                            return Err(RepairFailure {
                                source,
                                statement,
                                rejection: error,
                                estimated_bytes: estimated,
                            });
                        }
                    };
                    repaired = true;
                    State::Estimating { statement: fixed }
                }

                State::Done(outcome) => {
                    info!(
                        status = ?outcome.status(),
                        repaired = outcome.repaired,
                        estimated_bytes = ?outcome.estimated_bytes,
                        "Execution finished"
                    );
                    return Ok(outcome);
                }
            };
        }
    }

    /// Route a rejection to the single repair, or end the run once it is spent
    fn on_rejection<T>(
        &self,
        statement: String,
        rejection: EngineRejection,
        repaired: bool,
        terminal: impl FnOnce(String, ExecutionError) -> State<T>,
    ) -> State<T> {
        if repaired {
            let error = ExecutionError::Rejected {
                statement: statement.clone(),
                message: rejection.message,
            };
            terminal(statement, error)
        } else {
            State::Repairing {
                statement,
                error: rejection.message,
            }
        }
    }
}
