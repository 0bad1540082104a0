//! Catalog identifiers and the allowed-table set
//!
//! A table reference in a statement may be written with one, two or three
//! dotted segments. The guard resolves every reference against a
//! [`DefaultDataset`] into a [`CanonicalReference`] and then checks membership
//! in an [`AllowedCatalog`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Default dataset must look like 'project.dataset', got: '{0}'")]
    InvalidDefaultDataset(String),

    #[error("Allowed table must look like 'project.dataset.table', got: '{0}'")]
    InvalidTableName(String),
}

/// Fully-qualified `project.dataset.table` identifier.
///
/// Equality is case-sensitive on all three segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CanonicalReference {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl CanonicalReference {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Expand 1-3 segments using the defaults.
    ///
    /// Returns `None` for any other segment count or when a segment is empty.
    pub fn resolve(segments: &[&str], defaults: &DefaultDataset) -> Option<Self> {
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        match segments {
            [table] => Some(Self::new(&defaults.project, &defaults.dataset, *table)),
            [dataset, table] => Some(Self::new(&defaults.project, *dataset, *table)),
            [project, dataset, table] => Some(Self::new(*project, *dataset, *table)),
            _ => None,
        }
    }
}

impl fmt::Display for CanonicalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

impl FromStr for CanonicalReference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        match parts.as_slice() {
            [project, dataset, table]
                if !project.is_empty() && !dataset.is_empty() && !table.is_empty() =>
            {
                Ok(Self::new(*project, *dataset, *table))
            }
            _ => Err(ConfigError::InvalidTableName(s.to_string())),
        }
    }
}

/// Project and dataset used to qualify partial references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultDataset {
    pub project: String,
    pub dataset: String,
}

impl DefaultDataset {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
        }
    }

    /// Qualify a bare table name with this project and dataset
    pub fn qualify(&self, table: impl Into<String>) -> CanonicalReference {
        CanonicalReference::new(&self.project, &self.dataset, table)
    }
}

impl fmt::Display for DefaultDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project, self.dataset)
    }
}

impl FromStr for DefaultDataset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split('.').collect::<Vec<_>>().as_slice() {
            [project, dataset] if !project.is_empty() && !dataset.is_empty() => {
                Ok(Self::new(*project, *dataset))
            }
            _ => Err(ConfigError::InvalidDefaultDataset(s.to_string())),
        }
    }
}

/// Immutable set of tables a statement may read.
///
/// Built once per session by the caller and shared read-only (typically behind
/// an `Arc`) across guard invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedCatalog {
    tables: BTreeSet<CanonicalReference>,
}

impl AllowedCatalog {
    pub fn new(tables: impl IntoIterator<Item = CanonicalReference>) -> Self {
        Self {
            tables: tables.into_iter().collect(),
        }
    }

    /// Parse `project.dataset.table` names
    pub fn from_names<I, S>(names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| name.as_ref().parse::<CanonicalReference>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map(|tables| Self { tables })
    }

    /// Allow the given bare table names inside the default dataset
    pub fn for_dataset<I, S>(defaults: &DefaultDataset, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(tables.into_iter().map(|t| defaults.qualify(t)))
    }

    pub fn contains(&self, reference: &CanonicalReference) -> bool {
        self.tables.contains(reference)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalReference> {
        self.tables.iter()
    }
}

impl FromIterator<CanonicalReference> for AllowedCatalog {
    fn from_iter<T: IntoIterator<Item = CanonicalReference>>(iter: T) -> Self {
        Self::new(iter)
    }
}
