//! sqlgate MCP server
//!
//! Turns questions into read-only SQL, checks every statement with the guard
//! and runs it against DuckDB under a scan budget with at most one repair.

pub mod assumptions;
pub mod catalog;
pub mod config;
pub mod llm;
pub mod logging;
pub mod mcp;
pub mod metrics;
pub mod query;
