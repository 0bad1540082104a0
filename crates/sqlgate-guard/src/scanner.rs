//! Lexical scanner for guard checks
//!
//! The guard never builds a syntax tree. Instead the scanner classifies each
//! byte of a statement into a [`LexMode`] and runs a handful of small passes
//! over that view:
//!
//! - normalization and statement-shape checks
//! - whole-word denylist scan
//! - CTE name and scope collection
//! - masking of `EXTRACT(part FROM expr)` (and the other `FROM`-taking
//!   functions) so its `FROM` is not read as a clause
//! - relation extraction after `FROM` / `JOIN` and across `FROM` lists
//!
//! Quoting and comments follow DuckDB's tokenizer. A scanner that disagrees
//! with the engine about where a literal ends can be steered into hiding a
//! relation, so every pass works on the same [`lex_modes`] view.
//!
//! All keyword matching is ASCII case-insensitive. Word boundaries follow the
//! usual regex `\b` notion: a word is a maximal run of alphanumerics and `_`.

use std::collections::BTreeSet;

/// Characters that end a statement (ASCII and full-width semicolon).
pub const TERMINATORS: [char; 2] = [';', '\u{FF1B}'];

/// Mutating, DDL, administrative and scripting keywords.
///
/// `end` is not listed: it closes `CASE ... END` in read-only SQL.
pub const DENYLIST: [&str; 18] = [
    "alter",
    "begin",
    "call",
    "commit",
    "create",
    "declare",
    "delete",
    "drop",
    "execute",
    "grant",
    "insert",
    "merge",
    "revoke",
    "rollback",
    "set",
    "transaction",
    "truncate",
    "update",
];

/// Replacement for a masked `FROM`. Same byte length, never matches a keyword.
pub const MASK_SENTINEL: &str = "FR0M";

/// Functions whose argument list may hold a `FROM` that is not a clause.
const MASKED_FUNCTIONS: &[&str] = &["extract", "overlay", "substring", "trim"];

/// Table functions that only generate values and never read a relation.
pub const GENERATOR_FUNCTIONS: &[&str] = &["generate_series", "range", "unnest"];

/// Words that open a query inside parentheses.
const QUERY_HEADS: &[&str] = &[
    "describe", "from", "pivot", "select", "show", "summarize", "table", "unpivot", "values",
    "with",
];

/// Statements that name a relation directly, as in `(SUMMARIZE t)`.
const STATEMENT_HEADS: &[&str] = &["describe", "pivot", "show", "summarize", "table", "unpivot"];

const SET_OPERATIONS: &[&str] = &["except", "intersect", "union"];

/// Words after which a `FROM` list has no further items.
const FROM_LIST_END: &[&str] = &[
    "except", "fetch", "group", "having", "intersect", "limit", "offset", "order", "qualify",
    "select", "union", "where", "window",
];

/// Lexical state of a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexMode {
    Code,
    SingleQuoted,
    DoubleQuoted,
    Backtick,
    DollarQuoted,
    LineComment,
    BlockComment,
}

/// Classify every byte of `text` the way DuckDB's tokenizer does.
///
/// Quotes escape by doubling (`'it''s'`, `"a""b"`). Backslash escapes only
/// apply inside `E'...'` strings. `$tag$ ... $tag$` is a string and block
/// comments nest. Delimiters carry the mode of the literal or comment they
/// delimit; an unterminated literal or comment runs to the end of the text.
pub fn lex_modes(text: &str) -> Vec<LexMode> {
    let bytes = text.as_bytes();
    let mut modes = vec![LexMode::Code; bytes.len()];
    let mut i = 0;

    while i < bytes.len() {
        let (mode, end) = match (bytes[i], bytes.get(i + 1).copied()) {
            (b'\'', _) => (
                LexMode::SingleQuoted,
                quoted_end(bytes, i, b'\'', is_escape_string(bytes, i)).unwrap_or(bytes.len()),
            ),
            (b'"', _) => (
                LexMode::DoubleQuoted,
                quoted_end(bytes, i, b'"', false).unwrap_or(bytes.len()),
            ),
            (b'`', _) => (
                LexMode::Backtick,
                quoted_end(bytes, i, b'`', false).unwrap_or(bytes.len()),
            ),
            (b'-', Some(b'-')) => (
                LexMode::LineComment,
                text[i..].find('\n').map_or(bytes.len(), |n| i + n + 1),
            ),
            (b'/', Some(b'*')) => (LexMode::BlockComment, block_comment_end(bytes, i)),
            (b'$', _) => match dollar_tag(text, i) {
                Some(tag) => (
                    LexMode::DollarQuoted,
                    text[i + tag.len()..]
                        .find(tag)
                        .map_or(bytes.len(), |n| i + tag.len() + n + tag.len()),
                ),
                None => (LexMode::Code, i + 1),
            },
            _ => (LexMode::Code, i + 1),
        };

        modes[i..end].fill(mode);
        i = end;
    }

    modes
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || !b.is_ascii()
}

/// `'` at `open` starts an `E'...'` string
fn is_escape_string(bytes: &[u8], open: usize) -> bool {
    open >= 1
        && bytes[open - 1].eq_ignore_ascii_case(&b'e')
        && (open < 2 || !is_word_byte(bytes[open - 2]))
}

/// End (exclusive) of the quoted run opened at `open`, `None` if unterminated
fn quoted_end(bytes: &[u8], open: usize, quote: u8, backslash: bool) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash && b == b'\\' {
            i += 2;
        } else if b == quote && bytes.get(i + 1) == Some(&quote) {
            i += 2;
        } else if b == quote {
            return Some(i + 1);
        } else {
            i += 1;
        }
    }
    None
}

/// End (exclusive) of the possibly nested block comment opened at `open`
fn block_comment_end(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut i = open;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// The `$tag$` delimiter starting at `at`, if any.
///
/// `$1` parameters and `$` inside identifiers are not delimiters.
fn dollar_tag(text: &str, at: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if at > 0 && is_word_byte(bytes[at - 1]) {
        return None;
    }

    let mut end = at + 1;
    if bytes.get(end).is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_') {
        while bytes.get(end).is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_') {
            end += 1;
        }
    }
    (bytes.get(end) == Some(&b'$')).then(|| &text[at..=end])
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Iterator over `(byte offset, word)` pairs
pub struct Words<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Iterator for Words<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos + self.text[self.pos..].find(is_word_char)?;
        let tail = &self.text[start..];
        let len = tail.find(|c: char| !is_word_char(c)).unwrap_or(tail.len());
        self.pos = start + len;
        Some((start, &tail[..len]))
    }
}

pub fn words(text: &str) -> Words<'_> {
    Words { text, pos: 0 }
}

/// True when `word` appears in `text` as a whole word
pub fn has_word(text: &str, word: &str) -> bool {
    words(text).any(|(_, w)| w.eq_ignore_ascii_case(word))
}

/// Trim surrounding whitespace and trailing terminators.
///
/// Returns `None` when nothing is left.
pub fn normalize(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .trim_end_matches(|c: char| c.is_whitespace() || TERMINATORS.contains(&c));

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Any terminator left after [`normalize`] separates two statements.
pub fn has_inner_terminator(cleaned: &str) -> bool {
    cleaned.contains(&TERMINATORS[..])
}

/// First whitespace-delimited token, lowercased
pub fn first_token(cleaned: &str) -> String {
    cleaned
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase()
}

/// Denylisted keywords present as whole words, sorted and de-duplicated.
pub fn denylisted_keywords(cleaned: &str) -> Vec<String> {
    words(cleaned)
        .filter_map(|(_, w)| DENYLIST.iter().find(|kw| w.eq_ignore_ascii_case(kw)))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|kw| kw.to_string())
        .collect()
}

/// A CTE name and the offset from which a bare reference means the CTE.
///
/// Before that offset (in its own body or an earlier one) the same name still
/// reads the base table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CteScope {
    pub name: String,
    pub visible_from: usize,
}

impl CteScope {
    /// True when an unqualified `name` at `offset` refers to this CTE
    pub fn covers(&self, name: &str, offset: usize) -> bool {
        offset >= self.visible_from && self.name.eq_ignore_ascii_case(name)
    }
}

/// CTEs defined by `<identifier> AS [[NOT] MATERIALIZED] (` in a `WITH`
/// statement.
///
/// A plain CTE is visible after its body closes. Under `WITH RECURSIVE` it is
/// also visible inside its own body.
pub fn cte_scopes(cleaned: &str, modes: &[LexMode]) -> Vec<CteScope> {
    if first_token(cleaned) != "with" {
        return Vec::new();
    }
    let recursive = words(cleaned)
        .nth(1)
        .is_some_and(|(_, w)| w.eq_ignore_ascii_case("recursive"));

    words(cleaned)
        .filter(|(start, word)| modes[*start] == LexMode::Code && is_identifier(word))
        .filter_map(|(start, word)| {
            let open = cte_body_open(cleaned, modes, start + word.len())?;
            let visible_from = if recursive {
                open
            } else {
                matching_paren(cleaned, modes, open).map_or(cleaned.len(), |close| close + 1)
            };
            Some(CteScope {
                name: word.to_string(),
                visible_from,
            })
        })
        .collect()
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Offset of the `(` opening a CTE body, given the end of its name
fn cte_body_open(text: &str, modes: &[LexMode], after: usize) -> Option<usize> {
    let pos = skip_code_trivia(text, modes, after);
    let rest = strip_keyword(&text[pos..], "as")?;
    let mut pos = skip_code_trivia(text, modes, text.len() - rest.len());

    for keyword in ["not", "materialized"] {
        if let Some(rest) = strip_keyword(&text[pos..], keyword) {
            pos = skip_code_trivia(text, modes, text.len() - rest.len());
        }
    }

    (text.as_bytes().get(pos) == Some(&b'(') && modes[pos] == LexMode::Code).then_some(pos)
}

/// Strip a leading keyword that ends on a word boundary
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &text[keyword.len()..];
    if rest.starts_with(is_word_char) {
        None
    } else {
        Some(rest)
    }
}

/// Skip whitespace and comments starting at `pos`
fn skip_code_trivia(text: &str, modes: &[LexMode], mut pos: usize) -> usize {
    while let Some(c) = text[pos..].chars().next() {
        let trivia = match modes[pos] {
            LexMode::LineComment | LexMode::BlockComment => true,
            LexMode::Code => c.is_whitespace(),
            _ => false,
        };
        if !trivia {
            break;
        }
        pos += c.len_utf8();
    }
    pos
}

/// Index of the `)` closing the `(` at `open`, counting only code bytes.
///
/// Returns `None` when the group never closes.
pub fn matching_paren(text: &str, modes: &[LexMode], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, byte) in text.as_bytes()[open..].iter().enumerate() {
        let i = open + offset;
        if modes[i] != LexMode::Code {
            continue;
        }
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Replace the `FROM` inside `EXTRACT(...)`, `SUBSTRING(...)`, `TRIM(...)` and
/// `OVERLAY(...)` groups with [`MASK_SENTINEL`].
///
/// A group is masked only when it has exactly one `FROM` at its top level and
/// no `select` word anywhere, comments and literals included. Anything else
/// is left as is, so every `FROM` in it is still read as a relation keyword.
/// Masked text has the same byte length as the input.
pub fn mask_date_part_keywords(text: &str, modes: &[LexMode]) -> String {
    let bytes = text.as_bytes();
    let mut masked = text.to_string();

    for (start, word) in words(text) {
        if modes[start] != LexMode::Code
            || !MASKED_FUNCTIONS.iter().any(|f| word.eq_ignore_ascii_case(f))
        {
            continue;
        }

        let open = skip_code_trivia(text, modes, start + word.len());
        if bytes.get(open) != Some(&b'(') || modes[open] != LexMode::Code {
            continue;
        }

        let Some(close) = matching_paren(text, modes, open) else {
            tracing::debug!(offset = start, "Unclosed {} group left unmasked", word);
            continue;
        };

        let group = &text[open..=close];
        if has_word(group, "select") {
            tracing::debug!(offset = start, "{} group holding a subquery left unmasked", word);
            continue;
        }

        let mut depth = 0usize;
        let depths: Vec<usize> = group
            .bytes()
            .enumerate()
            .map(|(offset, byte)| {
                if modes[open + offset] == LexMode::Code {
                    match byte {
                        b'(' => depth += 1,
                        b')' => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                }
                depth
            })
            .collect();

        let froms: Vec<usize> = words(group)
            .filter(|(offset, inner)| {
                inner.eq_ignore_ascii_case("from")
                    && modes[open + offset] == LexMode::Code
                    && depths[*offset] == 1
            })
            .map(|(offset, _)| open + offset)
            .collect();

        if let [at] = froms.as_slice() {
            masked.replace_range(*at..*at + MASK_SENTINEL.len(), MASK_SENTINEL);
        }
    }

    masked
}

/// Length of an unquoted path segment at the start of `text`.
///
/// `[A-Za-z_][A-Za-z0-9_]*` with single hyphens allowed between alphanumerics,
/// as in project ids like `bigquery-public-data`.
fn bare_segment_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_alphabetic() || *b == b'_' => {}
        _ => return 0,
    }

    let mut len = 1;
    while len < bytes.len() {
        let b = bytes[len];
        let hyphen_ok = b == b'-' && bytes.get(len + 1).is_some_and(|n| n.is_ascii_alphanumeric());
        if b.is_ascii_alphanumeric() || b == b'_' || hyphen_ok {
            len += 1;
        } else {
            break;
        }
    }
    len
}

/// What a relation position holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// A table or view path
    Table,
    /// A table function call such as `read_csv(...)`
    Function,
    /// A string literal, which DuckDB reads as a file path
    Literal,
}

/// One relation as written after `FROM` / `JOIN`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRef {
    pub raw: String,
    /// Path segments with quoting removed; empty for literals
    pub segments: Vec<String>,
    pub kind: RelationKind,
    /// Byte offset of the relation in the statement
    pub offset: usize,
}

/// A dotted path as written at a relation position
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathToken {
    raw: String,
    end: usize,
    segments: Vec<String>,
    is_call: bool,
}

struct RelationScan<'a> {
    text: &'a str,
    modes: &'a [LexMode],
}

impl RelationScan<'_> {
    fn skip_trivia(&self, pos: usize) -> usize {
        skip_code_trivia(self.text, self.modes, pos)
    }

    /// Read every item of the `FROM` list starting at `start`
    fn read_list(&self, start: usize, found: &mut Vec<RelationRef>) {
        for item in self.list_items(start) {
            self.read_item(item, found);
        }
    }

    /// Start offsets of the items in a `FROM` list.
    ///
    /// The list runs until a `)` closes the enclosing group or a clause word
    /// ends it. Every top-level comma starts another item.
    fn list_items(&self, start: usize) -> Vec<usize> {
        let bytes = self.text.as_bytes();
        let mut items = vec![start];
        let mut depth = 0usize;
        let mut i = start;

        while i < bytes.len() {
            if self.modes[i] != LexMode::Code {
                i += 1;
                continue;
            }
            match bytes[i] {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                b',' if depth == 0 => items.push(i + 1),
                b if is_word_byte(b) && (i == 0 || !is_word_byte(bytes[i - 1])) => {
                    let len = bytes[i..].iter().take_while(|b| is_word_byte(**b)).count();
                    let word = &bytes[i..i + len];
                    let ends_list = FROM_LIST_END
                        .iter()
                        .any(|w| word.eq_ignore_ascii_case(w.as_bytes()));
                    if depth == 0 && ends_list {
                        break;
                    }
                    i += len;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }

        items
    }

    /// Read the relation at one item position
    fn read_item(&self, start: usize, found: &mut Vec<RelationRef>) {
        let mut pos = self.skip_trivia(start);
        if let Some(rest) = strip_keyword(&self.text[pos..], "lateral") {
            pos = self.skip_trivia(self.text.len() - rest.len());
        }
        let Some(&first) = self.text.as_bytes().get(pos) else {
            return;
        };

        match self.modes[pos] {
            mode @ (LexMode::SingleQuoted | LexMode::DollarQuoted) => {
                let len = self.modes[pos..].iter().take_while(|m| **m == mode).count();
                record(found, RelationRef {
                    raw: self.text[pos..pos + len].to_string(),
                    segments: Vec::new(),
                    kind: RelationKind::Literal,
                    offset: pos,
                });
            }
            LexMode::Code if first == b'(' => {
                let inner = pos + 1;
                let head = self.skip_trivia(inner);
                let opens_query = words(&self.text[head..]).next().is_some_and(|(offset, word)| {
                    offset == 0 && QUERY_HEADS.iter().any(|h| word.eq_ignore_ascii_case(h))
                });
                // a query is read through its own FROM keywords
                if !opens_query {
                    self.read_list(inner, found);
                }
            }
            _ => {
                let Some(path) = self.read_path(pos) else {
                    return;
                };
                if !path.is_call {
                    record(found, RelationRef {
                        raw: path.raw,
                        segments: path.segments,
                        kind: RelationKind::Table,
                        offset: pos,
                    });
                    return;
                }

                let generator = matches!(path.segments.as_slice(), [name]
                    if GENERATOR_FUNCTIONS.iter().any(|f| name.eq_ignore_ascii_case(f)));
                if generator {
                    return;
                }
                let open = self.skip_trivia(path.end);
                let end = matching_paren(self.text, self.modes, open)
                    .map_or(self.text.len(), |close| close + 1);
                record(found, RelationRef {
                    raw: self.text[pos..end].to_string(),
                    segments: path.segments,
                    kind: RelationKind::Function,
                    offset: pos,
                });
            }
        }
    }

    /// Read a dotted path; whitespace and comments may surround each `.`
    fn read_path(&self, start: usize) -> Option<PathToken> {
        let bytes = self.text.as_bytes();
        let mut segments = Vec::new();
        let mut pos = start;
        let mut end = start;

        loop {
            match bytes.get(pos) {
                Some(&quote) if quote == b'"' || quote == b'`' => {
                    let close = quoted_end(bytes, pos, quote, false)?;
                    let quote = char::from(quote);
                    let name = self.text[pos + 1..close - 1]
                        .replace(&format!("{quote}{quote}"), &quote.to_string());
                    segments.extend(name.split('.').map(str::to_string));
                    pos = close;
                }
                _ => {
                    let len = bare_segment_len(&self.text[pos..]);
                    if len == 0 {
                        break;
                    }
                    segments.push(self.text[pos..pos + len].to_string());
                    pos += len;
                }
            }

            end = pos;
            let dot = self.skip_trivia(pos);
            if bytes.get(dot) == Some(&b'.') && self.modes[dot] == LexMode::Code {
                pos = self.skip_trivia(dot + 1);
            } else {
                break;
            }
        }

        if segments.is_empty() {
            return None;
        }
        Some(PathToken {
            raw: self.text[start..end].to_string(),
            end,
            segments,
            is_call: bytes.get(self.skip_trivia(end)) == Some(&b'('),
        })
    }

    /// Last byte before `pos` that is neither whitespace nor comment
    fn previous_significant(&self, pos: usize) -> Option<usize> {
        (0..pos).rev().find(|&j| match self.modes[j] {
            LexMode::LineComment | LexMode::BlockComment => false,
            LexMode::Code => !self.text.as_bytes()[j].is_ascii_whitespace(),
            _ => true,
        })
    }

    /// True when `code_words[i]` starts a statement: it follows `(` or a set
    /// operation such as `UNION ALL`
    fn opens_statement(&self, code_words: &[(usize, &str)], i: usize) -> bool {
        let mut k = i;
        loop {
            let Some(prev) = self.previous_significant(code_words[k].0) else {
                return true;
            };
            if self.text.as_bytes()[prev] == b'(' && self.modes[prev] == LexMode::Code {
                return true;
            }
            if k == 0 {
                return false;
            }

            let (start, word) = code_words[k - 1];
            if start + word.len() != prev + 1 {
                return false;
            }
            if SET_OPERATIONS.iter().any(|op| word.eq_ignore_ascii_case(op)) {
                return true;
            }
            if !word.eq_ignore_ascii_case("all") && !word.eq_ignore_ascii_case("distinct") {
                return false;
            }
            k -= 1;
        }
    }
}

fn record(found: &mut Vec<RelationRef>, relation: RelationRef) {
    if !found.iter().any(|seen| seen.raw == relation.raw) {
        found.push(relation);
    }
}

/// Relations read by a statement, in first-seen order.
///
/// Every code-mode `FROM` starts a list whose comma-separated items are read,
/// as does every `JOIN`. `IS [NOT] DISTINCT FROM` is a comparison and starts
/// nothing. A statement head such as `SUMMARIZE` or `TABLE` that opens a
/// subquery or follows a set operation reads the relation after it.
///
/// An item is a path of any length (quoted or bare), a table function call,
/// a string literal, or a parenthesized join. A subquery contributes through
/// its own keywords. Only the functions in [`GENERATOR_FUNCTIONS`] are
/// skipped.
pub fn relation_references(masked: &str, modes: &[LexMode]) -> Vec<RelationRef> {
    let scan = RelationScan { text: masked, modes };
    let code_words: Vec<(usize, &str)> = words(masked)
        .filter(|(start, _)| modes[*start] == LexMode::Code)
        .collect();
    let mut found = Vec::new();

    for (i, &(start, word)) in code_words.iter().enumerate() {
        let after = start + word.len();
        if word.eq_ignore_ascii_case("join") {
            scan.read_item(after, &mut found);
        } else if word.eq_ignore_ascii_case("from") {
            let comparison = i >= 2
                && code_words[i - 1].1.eq_ignore_ascii_case("distinct")
                && ["is", "not"].iter().any(|w| code_words[i - 2].1.eq_ignore_ascii_case(w));
            if !comparison {
                scan.read_list(after, &mut found);
            }
        } else if STATEMENT_HEADS.iter().any(|h| word.eq_ignore_ascii_case(h))
            && scan.opens_statement(&code_words, i)
            && masked.as_bytes().get(scan.skip_trivia(after)) != Some(&b'(')
        {
            scan.read_item(after, &mut found);
        }
    }

    found
}
