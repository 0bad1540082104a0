use serde::{Deserialize, Serialize};

/// Materialized rows from an executed statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    /// More rows were available than the row cap allowed
    #[serde(default)]
    pub truncated: bool,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column name
    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_records() {
        let result = QueryResult {
            columns: vec!["id".into(), "name".into()],
            rows: vec![vec![json!(1), json!("Alice")], vec![json!(2), json!(null)]],
            row_count: 2,
            truncated: false,
        };
        let records = result.to_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], "Alice");
        assert!(records[1]["name"].is_null());
    }
}
