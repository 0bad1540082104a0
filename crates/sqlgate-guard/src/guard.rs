//! Guard verdicts
//!
//! [`check`] composes the scanner passes into a single pass/fail decision. It
//! short-circuits on the first failing step and always returns a
//! [`GuardVerdict`]; malformed input is never an `Err`.

use crate::catalog::{AllowedCatalog, CanonicalReference, DefaultDataset};
use crate::scanner::{self, RelationKind};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A reason a statement was refused
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Violation {
    #[error("empty input")]
    EmptyInput,

    #[error("multiple statements are not allowed (terminator found before end of statement)")]
    MultipleStatements,

    #[error("only SELECT/WITH queries are allowed (got '{0}')")]
    NotReadOnly(String),

    #[error("disallowed keyword(s): {}", .0.join(", "))]
    DisallowedKeywords(Vec<String>),

    #[error("unresolvable table reference(s): {}", .0.join(", "))]
    UnresolvableReferences(Vec<String>),

    #[error("query references tables outside allowlist: {}", .0.join(", "))]
    OutsideAllowlist(Vec<String>),
}

/// Intermediate collections from every step that ran
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub raw_sql: String,
    pub cleaned_sql: String,
    /// SHA-256 of the cleaned statement, hex encoded
    pub fingerprint: String,
    pub first_token: String,
    pub blocked_keywords: Vec<String>,
    pub cte_names: Vec<String>,
    pub masked_sql: String,
    pub table_refs_raw: Vec<String>,
    pub table_refs_normalized: Vec<String>,
    pub unresolved_refs: Vec<String>,
    pub rejected_refs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardVerdict {
    pub ok: bool,
    pub reasons: Vec<String>,
    pub violations: Vec<Violation>,
    pub cleaned_statement: String,
    pub diagnostics: Diagnostics,
}

impl GuardVerdict {
    fn pass(diagnostics: Diagnostics) -> Self {
        Self {
            ok: true,
            reasons: Vec::new(),
            violations: Vec::new(),
            cleaned_statement: diagnostics.cleaned_sql.clone(),
            diagnostics,
        }
    }

    fn fail(violations: Vec<Violation>, diagnostics: Diagnostics) -> Self {
        warn!(
            fingerprint = %diagnostics.fingerprint,
            reasons = ?violations.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Statement rejected by guard"
        );
        Self {
            ok: false,
            reasons: violations.iter().map(ToString::to_string).collect(),
            violations,
            cleaned_statement: diagnostics.cleaned_sql.clone(),
            diagnostics,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn fingerprint(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Validate a raw statement against an allowed catalog.
pub fn check(raw: &str, catalog: &AllowedCatalog, defaults: &DefaultDataset) -> GuardVerdict {
    let mut diag = Diagnostics {
        raw_sql: raw.to_string(),
        ..Default::default()
    };

    let Some(cleaned) = scanner::normalize(raw) else {
        return GuardVerdict::fail(vec![Violation::EmptyInput], diag);
    };
    diag.fingerprint = fingerprint(&cleaned);
    diag.cleaned_sql = cleaned;
    let cleaned = diag.cleaned_sql.as_str();

    if scanner::has_inner_terminator(cleaned) {
        return GuardVerdict::fail(vec![Violation::MultipleStatements], diag);
    }

    diag.first_token = scanner::first_token(cleaned);
    if diag.first_token != "select" && diag.first_token != "with" {
        let token = diag.first_token.clone();
        return GuardVerdict::fail(vec![Violation::NotReadOnly(token)], diag);
    }

    diag.blocked_keywords = scanner::denylisted_keywords(cleaned);
    if !diag.blocked_keywords.is_empty() {
        let blocked = diag.blocked_keywords.clone();
        return GuardVerdict::fail(vec![Violation::DisallowedKeywords(blocked)], diag);
    }

    let modes = scanner::lex_modes(cleaned);
    let ctes = scanner::cte_scopes(cleaned, &modes);
    diag.cte_names = ctes
        .iter()
        .map(|cte| cte.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    diag.masked_sql = scanner::mask_date_part_keywords(cleaned, &modes);
    let relations = scanner::relation_references(&diag.masked_sql, &modes);
    diag.table_refs_raw = relations.iter().map(|r| r.raw.clone()).collect();
    debug!(
        ctes = ?diag.cte_names,
        refs = ?diag.table_refs_raw,
        "Extracted relation references"
    );

    let mut resolved: Vec<CanonicalReference> = Vec::new();
    for relation in &relations {
        // table functions and file literals never name a catalog table
        if relation.kind != RelationKind::Table {
            diag.unresolved_refs.push(relation.raw.clone());
            continue;
        }

        let is_cte = matches!(relation.segments.as_slice(), [name]
            if ctes.iter().any(|cte| cte.covers(name, relation.offset)));
        if is_cte {
            continue;
        }

        let parts: Vec<&str> = relation.segments.iter().map(String::as_str).collect();
        match CanonicalReference::resolve(&parts, defaults) {
            Some(reference) => {
                if !resolved.contains(&reference) {
                    resolved.push(reference);
                }
            }
            None => diag.unresolved_refs.push(relation.raw.clone()),
        }
    }
    diag.table_refs_normalized = resolved.iter().map(ToString::to_string).collect();
    diag.rejected_refs = resolved
        .iter()
        .filter(|reference| !catalog.contains(reference))
        .map(ToString::to_string)
        .collect();

    let mut violations = Vec::new();
    if !diag.unresolved_refs.is_empty() {
        violations.push(Violation::UnresolvableReferences(diag.unresolved_refs.clone()));
    }
    if !diag.rejected_refs.is_empty() {
        violations.push(Violation::OutsideAllowlist(diag.rejected_refs.clone()));
    }
    if !violations.is_empty() {
        return GuardVerdict::fail(violations, diag);
    }

    info!(
        fingerprint = %diag.fingerprint,
        tables = ?diag.table_refs_normalized,
        "Statement passed guard"
    );
    GuardVerdict::pass(diag)
}

/// Guard bound to one catalog and default dataset.
///
/// Cheap to clone; the catalog is shared read-only between clones.
#[derive(Debug, Clone)]
pub struct SqlGuard {
    catalog: Arc<AllowedCatalog>,
    defaults: DefaultDataset,
}

impl SqlGuard {
    pub fn new(catalog: impl Into<Arc<AllowedCatalog>>, defaults: DefaultDataset) -> Self {
        Self {
            catalog: catalog.into(),
            defaults,
        }
    }

    pub fn check(&self, raw: &str) -> GuardVerdict {
        check(raw, &self.catalog, &self.defaults)
    }

    pub fn catalog(&self) -> &AllowedCatalog {
        &self.catalog
    }

    pub fn defaults(&self) -> &DefaultDataset {
        &self.defaults
    }
}
