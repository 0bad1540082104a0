//! Collaborator seams for the orchestrator

use thiserror::Error;

/// Bytes in one GiB; budgets and estimates are reported in these units.
pub const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// The engine refused to plan or run a statement
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineRejection {
    pub message: String,
}

impl EngineRejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<duckdb::Error> for EngineRejection {
    fn from(err: duckdb::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// The repair collaborator itself failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepairError {
    #[error("Repair service unavailable: {0}")]
    Unavailable(String),

    #[error("Repair produced an unusable statement: {0}")]
    Unusable(String),
}

/// A metered query engine.
///
/// `estimate` must plan without scanning or returning data.
pub trait QueryEngine {
    type Output;

    fn estimate(&self, statement: &str) -> Result<u64, EngineRejection>;

    fn execute(&self, statement: &str) -> Result<Self::Output, EngineRejection>;
}

impl<E: QueryEngine + ?Sized> QueryEngine for &E {
    type Output = E::Output;

    fn estimate(&self, statement: &str) -> Result<u64, EngineRejection> {
        (**self).estimate(statement)
    }

    fn execute(&self, statement: &str) -> Result<Self::Output, EngineRejection> {
        (**self).execute(statement)
    }
}

/// Produces a new candidate statement from a rejected one and the engine's error
pub trait Repairer {
    fn repair(&self, statement: &str, error: &str) -> Result<String, RepairError>;
}

impl<F> Repairer for F
where
    F: Fn(&str, &str) -> Result<String, RepairError>,
{
    fn repair(&self, statement: &str, error: &str) -> Result<String, RepairError> {
        self(statement, error)
    }
}

/// Optional ceiling on projected bytes scanned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    pub max_bytes: Option<u64>,
}

impl Budget {
    pub fn unbounded() -> Self {
        Self { max_bytes: None }
    }

    pub fn bytes(max_bytes: u64) -> Self {
        Self {
            max_bytes: Some(max_bytes),
        }
    }

    /// Negative or non-finite values clamp to zero.
    pub fn from_gib(gib: f64) -> Self {
        let bytes = if gib.is_finite() && gib > 0.0 {
            (gib * BYTES_PER_GIB as f64) as u64
        } else {
            0
        };
        Self::bytes(bytes)
    }

    pub fn allows(&self, estimated_bytes: u64) -> bool {
        self.max_bytes.map_or(true, |max| estimated_bytes <= max)
    }
}

impl From<Option<f64>> for Budget {
    fn from(max_gib: Option<f64>) -> Self {
        max_gib.map_or_else(Self::unbounded, Self::from_gib)
    }
}

/// Render a byte count as GiB with two decimals
pub fn format_gib(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / BYTES_PER_GIB as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_allows() {
        assert!(Budget::unbounded().allows(u64::MAX));
        assert!(Budget::bytes(10).allows(10));
        assert!(!Budget::bytes(10).allows(11));
    }

    #[test]
    fn test_budget_from_gib() {
        assert_eq!(Budget::from_gib(2.0).max_bytes, Some(2 * BYTES_PER_GIB));
        assert_eq!(Budget::from_gib(-1.0).max_bytes, Some(0));
        assert_eq!(Budget::from_gib(f64::NAN).max_bytes, Some(0));
        assert_eq!(Budget::from(None), Budget::unbounded());
    }

    #[test]
    fn test_format_gib() {
        assert_eq!(format_gib(5 * BYTES_PER_GIB), "5.00 GB");
        assert_eq!(format_gib(BYTES_PER_GIB + BYTES_PER_GIB / 5), "1.20 GB");
    }

    #[test]
    fn test_closure_repairer() {
        let repair = |stmt: &str, _err: &str| Ok::<_, RepairError>(format!("{stmt} LIMIT 1"));
        assert_eq!(repair.repair("SELECT 1", "boom").unwrap(), "SELECT 1 LIMIT 1");
    }
}
