//! SQL safety guard
//!
//! Static, lexical validation of untrusted SQL before it may reach a query
//! engine: one read-only statement, no mutating keywords, and every table it
//! reads inside an allowed catalog.

pub mod catalog;
pub mod guard;
pub mod scanner;

pub use catalog::{AllowedCatalog, CanonicalReference, ConfigError, DefaultDataset};
pub use guard::{check, Diagnostics, GuardVerdict, SqlGuard, Violation};
