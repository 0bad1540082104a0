//! Assumption notes for ambiguous questions
//!
//! Notes are for transparency only. They never change the generated SQL.

use serde::{Deserialize, Serialize};

/// One note, emitted when a question mentions any `when_any` phrase and none
/// of the `unless_any` phrases
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssumptionRule {
    /// Triggering phrases; empty matches every question
    pub when_any: Vec<String>,

    /// Phrases that mean the question already settled the ambiguity
    pub unless_any: Vec<String>,

    /// Suppress the note when the question names a year (1900-2099)
    pub unless_year: bool,

    pub note: String,
}

impl AssumptionRule {
    fn applies(&self, words: &[String]) -> bool {
        let mentions = |phrases: &[String]| phrases.iter().any(|p| contains_phrase(words, p));

        (self.when_any.is_empty() || mentions(&self.when_any))
            && !mentions(&self.unless_any)
            && !(self.unless_year && words.iter().any(|w| is_year(w)))
    }
}

/// Assumption rules configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssumptionsConfig {
    pub rules: Vec<AssumptionRule>,
}

impl Default for AssumptionsConfig {
    fn default() -> Self {
        let phrases = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            rules: vec![
                AssumptionRule {
                    when_any: phrases(&["revenue", "sales"]),
                    unless_any: phrases(&[
                        "net", "refund", "refunds", "return", "returns", "canceled", "cancelled",
                        "profit", "margin", "gmv", "gross sales",
                    ]),
                    unless_year: false,
                    note: "Interpreting 'revenue/sales' as gross booked sales; refunds and returns are not netted out."
                        .to_string(),
                },
                AssumptionRule {
                    when_any: phrases(&["mom", "month-over-month", "month over month", "growth"]),
                    unless_any: Vec::new(),
                    unless_year: false,
                    note: "Growth is (x - previous x) / previous x, ordered by month; undefined when the previous value is zero."
                        .to_string(),
                },
                AssumptionRule {
                    when_any: Vec::new(),
                    unless_any: phrases(&[
                        "between", "since", "after", "before", "ytd", "q1", "q2", "q3", "q4",
                        "last", "this", "today", "yesterday",
                    ]),
                    unless_year: true,
                    note: "No explicit date range provided; the query may use all available data."
                        .to_string(),
                },
            ],
        }
    }
}

/// Notes for every rule the question triggers, in rule order, without repeats
pub fn infer(question: &str, rules: &[AssumptionRule]) -> Vec<String> {
    let words = words(question);
    let mut notes: Vec<String> = Vec::new();
    for rule in rules.iter().filter(|rule| rule.applies(&words)) {
        if !rule.note.is_empty() && !notes.contains(&rule.note) {
            notes.push(rule.note.clone());
        }
    }
    notes
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whole-word match of a possibly multi-word phrase
fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle = self::words(phrase);
    !needle.is_empty() && words.windows(needle.len()).any(|window| window == needle.as_slice())
}

fn is_year(word: &str) -> bool {
    word.len() == 4
        && word.bytes().all(|b| b.is_ascii_digit())
        && (word.starts_with("19") || word.starts_with("20"))
}
