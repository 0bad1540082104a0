//! Property tests for the guard
//!
//! Statements are assembled from small generated fragments so every case is
//! either known-good or known-bad by construction.

use proptest::prelude::*;
use sqlgate_guard::{check, AllowedCatalog, DefaultDataset, Violation};

const TABLES: [&str; 5] = ["orders", "users", "items", "events", "sessions"];

fn defaults() -> DefaultDataset {
    DefaultDataset::new("proj", "ds")
}

fn full_catalog() -> AllowedCatalog {
    AllowedCatalog::for_dataset(&defaults(), TABLES)
}

/// Qualify a table name one of three ways
fn written(table: &str, style: u8) -> String {
    match style % 3 {
        0 => format!("proj.ds.{table}"),
        1 => format!("ds.{table}"),
        _ => format!("`proj.ds.{table}`"),
    }
}

fn terminators() -> impl Strategy<Value = String> {
    prop::collection::vec(prop_oneof![Just(";"), Just("\u{FF1B}"), Just(" "), Just("\n")], 0..4)
        .prop_map(|parts| parts.concat())
}

/// Complete tokens that a lexer with the wrong quoting rules misreads
fn lexer_noise() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        r"'\'",
        "''''",
        "'it''s'",
        "/* ' */",
        "/* /* ' */ ) */",
        "-- ' )\n",
        "$$ ' ) $$",
        "$q$ \" $q$",
        r"E'\''",
        "'\"'",
        "\"'\"",
        "`'`",
    ])
}

proptest! {
    #[test]
    fn test_idempotent_on_passing_statements(
        table in 0..TABLES.len(),
        style in any::<u8>(),
        limit in 1u32..1000,
        tail in terminators(),
    ) {
        let sql = format!(
            "  SELECT id, created_at FROM {} WHERE id > 0 LIMIT {limit}{tail}",
            written(TABLES[table], style)
        );
        let first = check(&sql, &full_catalog(), &defaults());
        prop_assert!(first.ok, "{:?}", first.reasons);

        let second = check(&first.cleaned_statement, &full_catalog(), &defaults());
        prop_assert_eq!(second.ok, first.ok);
        prop_assert_eq!(second.cleaned_statement, first.cleaned_statement);
    }

    #[test]
    fn test_denylist_respects_word_boundaries(
        keyword in prop::sample::select(sqlgate_guard::scanner::DENYLIST.to_vec()),
        prefix in "[a-z]{1,4}_?",
        suffix in "_?[a-z0-9]{1,4}",
    ) {
        let columns = format!("{prefix}{keyword}, {keyword}{suffix}, {prefix}{keyword}{suffix}");
        let sql = format!("SELECT {columns} FROM proj.ds.orders");
        let verdict = check(&sql, &full_catalog(), &defaults());
        prop_assert!(verdict.ok, "{} -> {:?}", sql, verdict.reasons);
    }

    #[test]
    fn test_standalone_denylisted_keyword_rejected(
        keyword in prop::sample::select(sqlgate_guard::scanner::DENYLIST.to_vec()),
        upper in any::<bool>(),
    ) {
        let keyword = if upper { keyword.to_uppercase() } else { keyword.to_string() };
        let sql = format!("SELECT a FROM proj.ds.orders WHERE b = 1 OR {keyword} = 2");
        let verdict = check(&sql, &full_catalog(), &defaults());
        prop_assert!(!verdict.ok);
        prop_assert_eq!(
            verdict.violations,
            vec![Violation::DisallowedKeywords(vec![keyword.to_lowercase()])]
        );
    }

    #[test]
    fn test_inner_terminator_rejected(
        follow in "[a-z][a-z ]{0,12}",
        terminator in prop_oneof![Just(";"), Just("\u{FF1B}")],
        tail in terminators(),
    ) {
        let sql = format!("SELECT 1 FROM proj.ds.orders{terminator} {follow}{tail}");
        let verdict = check(&sql, &full_catalog(), &defaults());
        prop_assert_eq!(verdict.violations, vec![Violation::MultipleStatements]);
    }

    #[test]
    fn test_allowlist_iff_subset(
        allowed in prop::collection::vec(any::<bool>(), TABLES.len()),
        referenced in prop::collection::btree_set(0..TABLES.len(), 1..=TABLES.len()),
        style in any::<u8>(),
    ) {
        let catalog = AllowedCatalog::for_dataset(
            &defaults(),
            TABLES.iter().zip(&allowed).filter(|(_, keep)| **keep).map(|(t, _)| *t),
        );

        let mut relations = referenced.iter().map(|i| written(TABLES[*i], style));
        let mut sql = format!("SELECT * FROM {} t0", relations.next().unwrap_or_default());
        for (n, relation) in relations.enumerate() {
            sql.push_str(&format!(" JOIN {relation} t{} ON t0.id = t{}.id", n + 1, n + 1));
        }

        let expected = referenced.iter().all(|i| allowed[*i]);
        let verdict = check(&sql, &catalog, &defaults());
        prop_assert_eq!(verdict.ok, expected, "{} -> {:?}", sql, verdict.reasons);
    }

    #[test]
    fn test_extract_group_never_yields_reference(
        depth in 0usize..6,
        part in prop::sample::select(vec!["YEAR", "MONTH", "DAY", "HOUR"]),
    ) {
        let open = "(".repeat(depth);
        let close = ")".repeat(depth);
        let sql = format!(
            "SELECT EXTRACT({part} FROM {open}secret.vault{close}) FROM proj.ds.orders"
        );
        let verdict = check(&sql, &full_catalog(), &defaults());
        prop_assert!(verdict.ok, "{} -> {:?}", sql, verdict.reasons);
        prop_assert_eq!(verdict.diagnostics.table_refs_raw, vec!["proj.ds.orders".to_string()]);
    }

    #[test]
    fn test_subquery_in_extract_survives_lexer_noise(
        before in lexer_noise(),
        inside in lexer_noise(),
        part in prop::sample::select(vec!["YEAR", "MONTH", "DAY"]),
        qualified in any::<bool>(),
    ) {
        let hidden = if qualified { "proj.hr.salaries" } else { "salaries" };
        let sql = format!(
            "SELECT EXTRACT({part} FROM DATE '2024-01-01' + CASE WHEN {before} <> '' \
             THEN (SELECT count(*) {inside} FROM {hidden})::INT ELSE 0 END) AS y \
             FROM proj.ds.orders"
        );
        let verdict = check(&sql, &full_catalog(), &defaults());
        let expected = if qualified { "proj.hr.salaries" } else { "proj.ds.salaries" };
        prop_assert!(!verdict.ok, "{}", sql);
        prop_assert!(
            verdict.diagnostics.rejected_refs.contains(&expected.to_string()),
            "{} -> {:?}",
            sql,
            verdict.diagnostics.rejected_refs
        );
    }

    #[test]
    fn test_noise_before_subquery_never_hides_join(noise in lexer_noise()) {
        let sql = format!(
            "SELECT * FROM proj.ds.orders o WHERE o.note = {noise} OR o.id IN \
             (SELECT s.id FROM proj.ds.users s JOIN proj.hr.salaries p ON p.id = s.id)"
        );
        let verdict = check(&sql, &full_catalog(), &defaults());
        prop_assert_eq!(
            verdict.violations,
            vec![Violation::OutsideAllowlist(vec!["proj.hr.salaries".into()])]
        );
    }
}

#[test]
fn test_cte_with_comma_join_and_comment() {
    let sql = "WITH recent AS (\n  SELECT * FROM proj.ds.orders -- last week\n)\n\
               SELECT r.id, u.name FROM `recent` r, /* users */ ds.users u";
    let verdict = check(sql, &full_catalog(), &defaults());
    assert!(verdict.ok, "{:?}", verdict.reasons);
    assert_eq!(
        verdict.diagnostics.table_refs_normalized,
        vec!["proj.ds.orders", "proj.ds.users"]
    );
}

#[test]
fn test_bare_and_spaced_names_cannot_smuggle_table() {
    for sql in [
        "SELECT * FROM proj.ds.orders o, salaries s",
        "SELECT * FROM proj . hr . salaries",
        "SELECT * FROM (proj.ds.orders CROSS JOIN users), salaries",
    ] {
        let verdict = check(sql, &full_catalog(), &defaults());
        assert!(!verdict.ok, "{sql}");
        assert_eq!(verdict.diagnostics.rejected_refs.len(), 1, "{sql}");
    }
}

#[test]
fn test_comma_join_cannot_smuggle_table() {
    let sql = "SELECT * FROM proj.ds.orders o, proj.hr.salaries s";
    let verdict = check(sql, &full_catalog(), &defaults());
    assert_eq!(
        verdict.violations,
        vec![Violation::OutsideAllowlist(vec!["proj.hr.salaries".into()])]
    );
}
