//! Schema cache and allowlist construction
//!
//! Table and column metadata come from DuckDB's `information_schema` for the
//! default dataset and are cached as JSON on disk. The allowed catalog handed
//! to the guard is derived from the cached tables.

use crate::config::SchemaCacheConfig;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use sqlgate_guard::{AllowedCatalog, DefaultDataset};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Table types the guard may read
const READABLE_TABLE_TYPES: &[&str] = &["BASE TABLE", "VIEW", "MATERIALIZED VIEW", "EXTERNAL"];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Schema cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema cache is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_type: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaCache {
    pub dataset: DefaultDataset,
    pub generated_at: DateTime<Utc>,
    pub tables: BTreeMap<String, TableSchema>,
}

impl SchemaCache {
    /// Read tables and columns of one dataset from `information_schema`
    pub fn fetch(conn: &Connection, dataset: &DefaultDataset) -> Result<Self, CatalogError> {
        let params = [dataset.project.as_str(), dataset.dataset.as_str()];

        let mut stmt = conn.prepare(
            "SELECT table_name, table_type FROM information_schema.tables \
             WHERE table_catalog = ? AND table_schema = ? ORDER BY table_name",
        )?;
        let mut tables: BTreeMap<String, TableSchema> = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    TableSchema {
                        table_type: row.get(1)?,
                        columns: Vec::new(),
                    },
                ))
            })?
            .collect::<Result<_, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT table_name, column_name, data_type FROM information_schema.columns \
             WHERE table_catalog = ? AND table_schema = ? ORDER BY table_name, ordinal_position",
        )?;
        let columns = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                ColumnInfo {
                    name: row.get(1)?,
                    data_type: row.get(2)?,
                },
            ))
        })?;
        for column in columns {
            let (table, column) = column?;
            tables
                .entry(table)
                .or_insert_with(|| TableSchema {
                    table_type: "UNKNOWN".to_string(),
                    columns: Vec::new(),
                })
                .columns
                .push(column);
        }

        info!(dataset = %dataset, tables = tables.len(), "Fetched schema");
        Ok(Self {
            dataset: dataset.clone(),
            generated_at: Utc::now(),
            tables,
        })
    }

    /// Reuse the cache file while fresh, otherwise fetch and rewrite it
    pub fn load(
        conn: &Connection,
        dataset: &DefaultDataset,
        config: &SchemaCacheConfig,
        force_refresh: bool,
    ) -> Result<Self, CatalogError> {
        let path = Path::new(&config.path);

        if !force_refresh {
            match Self::read(path) {
                Ok(Some(cached)) if cached.is_fresh(dataset, config.ttl_seconds) => {
                    debug!(path = %path.display(), "Using cached schema");
                    return Ok(cached);
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Ignoring unreadable schema cache"),
            }
        }

        let schema = Self::fetch(conn, dataset)?;
        schema.write(path)?;
        Ok(schema)
    }

    fn read(path: &Path) -> Result<Option<Self>, CatalogError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write(&self, path: &Path) -> Result<(), CatalogError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn is_fresh(&self, dataset: &DefaultDataset, ttl_seconds: i64) -> bool {
        let age = Utc::now().signed_duration_since(self.generated_at).num_seconds();
        &self.dataset == dataset && age <= ttl_seconds
    }

    /// Readable tables, optionally restricted to the given bare names
    pub fn allowed_catalog(&self, restrict_to: &[String]) -> AllowedCatalog {
        let names = self
            .tables
            .iter()
            .filter(|(_, table)| {
                READABLE_TABLE_TYPES
                    .iter()
                    .any(|t| table.table_type.eq_ignore_ascii_case(t))
            })
            .map(|(name, _)| name)
            .filter(|name| restrict_to.is_empty() || restrict_to.contains(name))
            .cloned();

        AllowedCatalog::for_dataset(&self.dataset, names)
    }

    /// Short column listing of the allowed tables for a prompt
    pub fn render_context(&self, allowed: &AllowedCatalog, max_columns: usize) -> String {
        let mut lines =
            vec!["SCHEMA (only use columns listed below; do NOT invent columns):".to_string()];

        for reference in allowed.iter() {
            let Some(table) = self.tables.get(&reference.table) else {
                continue;
            };
            if table.columns.is_empty() {
                continue;
            }

            let shown: Vec<String> = table
                .columns
                .iter()
                .take(max_columns)
                .map(|c| format!("{}:{}", c.name, c.data_type))
                .collect();
            let suffix = if table.columns.len() > max_columns {
                " ... (truncated)"
            } else {
                ""
            };
            lines.push(format!("- {reference} columns: {}{suffix}", shown.join(", ")));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER, total DOUBLE, created_at TIMESTAMP);
             CREATE TABLE users (id INTEGER, name VARCHAR);
             CREATE VIEW big_orders AS SELECT * FROM orders WHERE total > 100;
             CREATE SCHEMA staging;
             CREATE TABLE staging.raw_events (payload VARCHAR);",
        )
        .unwrap();
        conn
    }

    fn dataset() -> DefaultDataset {
        DefaultDataset::new("memory", "main")
    }

    #[test]
    fn test_fetch_reads_one_dataset() {
        let schema = SchemaCache::fetch(&connection(), &dataset()).unwrap();
        let names: Vec<_> = schema.tables.keys().cloned().collect();
        assert_eq!(names, vec!["big_orders", "orders", "users"]);
        assert_eq!(schema.tables["orders"].columns.len(), 3);
        assert_eq!(schema.tables["big_orders"].table_type, "VIEW");
    }

    #[test]
    fn test_allowed_catalog_restriction() {
        let schema = SchemaCache::fetch(&connection(), &dataset()).unwrap();

        let all = schema.allowed_catalog(&[]);
        assert_eq!(all.len(), 3);
        assert!(all.contains(&"memory.main.big_orders".parse().unwrap()));

        let some = schema.allowed_catalog(&["users".to_string(), "missing".to_string()]);
        assert_eq!(some.len(), 1);
        assert!(some.contains(&"memory.main.users".parse().unwrap()));
    }

    #[test]
    fn test_render_context_truncates() {
        let schema = SchemaCache::fetch(&connection(), &dataset()).unwrap();
        let allowed = schema.allowed_catalog(&["orders".to_string()]);
        let context = schema.render_context(&allowed, 2);
        assert!(context.contains("- memory.main.orders columns: id:INTEGER, total:DOUBLE ... (truncated)"));
        assert!(!context.contains("users"));
    }

    #[test]
    fn test_cache_round_trip_and_ttl() {
        let path = std::env::temp_dir().join(format!("sqlgate-schema-{}.json", uuid::Uuid::new_v4()));
        let config = SchemaCacheConfig {
            path: path.display().to_string(),
            ttl_seconds: 3600,
            ..Default::default()
        };
        let conn = connection();

        let first = SchemaCache::load(&conn, &dataset(), &config, false).unwrap();
        assert!(path.exists());

        conn.execute_batch("CREATE TABLE late (x INTEGER);").unwrap();
        let cached = SchemaCache::load(&conn, &dataset(), &config, false).unwrap();
        assert_eq!(cached, first);

        let refreshed = SchemaCache::load(&conn, &dataset(), &config, true).unwrap();
        assert!(refreshed.tables.contains_key("late"));

        assert!(!refreshed.is_fresh(&DefaultDataset::new("memory", "staging"), 3600));
        std::fs::remove_file(path).ok();
    }
}
