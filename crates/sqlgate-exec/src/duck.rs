//! DuckDB-backed query engine
//!
//! Three-part names map onto DuckDB's `database.schema.table`. Estimates come
//! from the JSON physical plan (`EXPLAIN (FORMAT JSON)`), which plans the
//! statement without scanning any data.

use crate::engine::{EngineRejection, QueryEngine};
use crate::result::QueryResult;
use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::{AccessMode, Config, Connection};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Bytes assumed per projected value when sizing a scan
const BYTES_PER_VALUE: u64 = 8;

/// Days from 0001-01-01 (CE) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to open database '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),
}

pub struct DuckDbEngine {
    conn: Connection,
    row_cap: Option<usize>,
}

impl DuckDbEngine {
    /// Open a database file, optionally read-only.
    ///
    /// External access is disabled: statements cannot read files or URLs
    /// through table functions, and cannot attach other databases.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let open_err = |source| EngineError::Open {
            path: path.display().to_string(),
            source,
        };

        let mut config = sealed_config().map_err(open_err)?;
        if read_only {
            config = config.access_mode(AccessMode::ReadOnly).map_err(open_err)?;
        }
        let conn = Connection::open_with_flags(path, config).map_err(open_err)?;

        info!(path = %path.display(), read_only, "Opened DuckDB database");
        Ok(Self::from_connection(conn))
    }

    /// Empty in-memory database with external access disabled
    pub fn in_memory() -> Result<Self, EngineError> {
        Ok(Self::from_connection(Connection::open_in_memory_with_flags(
            sealed_config()?,
        )?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn, row_cap: None }
    }

    pub fn with_row_cap(mut self, row_cap: usize) -> Self {
        self.row_cap = Some(row_cap);
        self
    }

    /// Independent handle on the same database
    pub fn try_clone(&self) -> Result<Self, EngineError> {
        Ok(Self {
            conn: self.conn.try_clone()?,
            row_cap: self.row_cap,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn sealed_config() -> duckdb::Result<Config> {
    Config::default().enable_external_access(false)
}

impl QueryEngine for DuckDbEngine {
    type Output = QueryResult;

    fn estimate(&self, statement: &str) -> Result<u64, EngineRejection> {
        let mut stmt = self.conn.prepare(&format!("EXPLAIN (FORMAT JSON) {statement}"))?;
        let mut rows = stmt.query([])?;

        let mut bytes = 0u64;
        while let Some(row) = rows.next()? {
            let plan: String = row.get(1)?;
            let plan: Value = serde_json::from_str(&plan)
                .map_err(|e| EngineRejection::new(format!("Unreadable plan: {e}")))?;
            bytes = bytes.saturating_add(scan_bytes(&plan));
        }

        debug!(bytes, "Estimated scan bytes from plan");
        Ok(bytes)
    }

    fn execute(&self, statement: &str) -> Result<QueryResult, EngineRejection> {
        let mut stmt = self.conn.prepare(statement)?;
        let mut rows = stmt.query([])?;
        let columns: Vec<String> = rows
            .as_ref()
            .map(|s| s.column_names())
            .unwrap_or_default();

        let mut result = QueryResult {
            columns,
            ..Default::default()
        };

        while let Some(row) = rows.next()? {
            if self.row_cap.is_some_and(|cap| result.rows.len() >= cap) {
                result.truncated = true;
                break;
            }

            let values = (0..result.columns.len())
                .map(|i| row.get_ref(i).map(value_to_json))
                .collect::<Result<Vec<_>, _>>()?;
            result.rows.push(values);
        }
        result.row_count = result.rows.len();

        debug!(rows = result.row_count, truncated = result.truncated, "Executed statement");
        Ok(result)
    }
}

/// Sum `cardinality x projections x 8` over table scans in a JSON plan
fn scan_bytes(node: &Value) -> u64 {
    match node {
        Value::Array(nodes) => nodes.iter().map(scan_bytes).fold(0, u64::saturating_add),
        Value::Object(map) => {
            let own = map
                .get("extra_info")
                .filter(|_| {
                    map.get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|name| name.contains("SCAN"))
                })
                .filter(|info| info.get("Table").is_some() || info.get("Function").is_some())
                .map(|info| {
                    let rows = info.get("Estimated Cardinality").map_or(0, cardinality);
                    let columns = match info.get("Projections") {
                        Some(Value::Array(cols)) => cols.len().max(1) as u64,
                        _ => 1,
                    };
                    rows.saturating_mul(columns).saturating_mul(BYTES_PER_VALUE)
                })
                .unwrap_or(0);

            let children = map.get("children").map_or(0, scan_bytes);
            own.saturating_add(children)
        }
        _ => 0,
    }
}

/// DuckDB renders cardinalities as strings, sometimes prefixed with `~`
fn cardinality(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().trim_start_matches('~').parse().unwrap_or(0),
        _ => 0,
    }
}

fn micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

/// Time of day from microseconds since midnight; out of range is null
fn time_to_json(us: i64) -> Value {
    u32::try_from(us / 1_000_000)
        .ok()
        .zip(u32::try_from((us % 1_000_000) * 1_000).ok())
        .and_then(|(secs, nanos)| NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos))
        .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))
        .unwrap_or(Value::Null)
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::from(i),
        ValueRef::SmallInt(i) => Value::from(i),
        ValueRef::Int(i) => Value::from(i),
        ValueRef::BigInt(i) => Value::from(i),
        ValueRef::HugeInt(i) => i64::try_from(i)
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(i.to_string())),
        ValueRef::UTinyInt(i) => Value::from(i),
        ValueRef::USmallInt(i) => Value::from(i),
        ValueRef::UInt(i) => Value::from(i),
        ValueRef::UBigInt(i) => Value::from(i),
        ValueRef::Float(f) => serde_json::json!(f),
        ValueRef::Double(f) => serde_json::json!(f),
        ValueRef::Decimal(d) => {
            let text = d.to_string();
            text.parse::<f64>()
                .map(|f| serde_json::json!(f))
                .unwrap_or(Value::String(text))
        }
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
        ValueRef::Date32(days) => days
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        ValueRef::Timestamp(unit, v) => DateTime::from_timestamp_micros(micros(unit, v))
            .map(|ts| Value::String(ts.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null),
        ValueRef::Time64(unit, v) => time_to_json(micros(unit, v)),
        other => Value::String(format!("{:?}", other.to_owned())),
    }
}
