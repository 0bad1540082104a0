//! OpenAI integration: question to SQL, and single-shot SQL repair
//!
//! Model output is untrusted. It is normalized here and always goes through the
//! guard before reaching the engine.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use sqlgate_exec::RepairError;
use sqlgate_guard::scanner::has_word;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::LlmConfig;

/// Endings that mean the model stopped mid-statement
const DANGLING_WORDS: &[&str] = &["and", "between", "from", "join", "on", "or", "select", "where", "with"];

const AGGREGATE_CALLS: &[&str] = &["count(", "sum(", "avg(", "min(", "max("];

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("OpenAI request failed: {0}")]
    OpenAi(#[from] OpenAIError),

    #[error("Model returned no content")]
    EmptyResponse,

    #[error("Model returned empty or incomplete SQL: {0}")]
    Incomplete(String),
}

impl From<LlmError> for RepairError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::OpenAi(e) => RepairError::Unavailable(e.to_string()),
            other => RepairError::Unusable(other.to_string()),
        }
    }
}

/// Everything a prompt needs to know about the data
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    /// Fully-qualified names of the tables the guard allows
    pub allowed_tables: Vec<String>,
    pub schema_context: String,
    pub row_cap: usize,
}

/// SQL produced for a question and the model that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSql {
    pub sql: String,
    pub model: String,
}

pub struct LlmClient {
    client: Client<OpenAIConfig>,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(api_key: impl Into<String>, config: LlmConfig) -> Self {
        let openai_config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(openai_config),
            config,
        }
    }

    /// Generate SQL for a question, retrying once on the fallback model when
    /// the first answer is empty or truncated
    pub async fn generate_sql(
        &self,
        question: &str,
        context: &PromptContext,
    ) -> Result<GeneratedSql, LlmError> {
        let instructions = generation_instructions(context);

        let mut model = self.config.default_model.clone();
        let mut sql = normalize_sql(&self.complete(&model, &instructions, question.trim()).await?);

        if looks_incomplete_sql(&sql) {
            warn!(model = %model, "Incomplete SQL from default model, trying fallback");
            model = self.config.fallback_model.clone();
            sql = normalize_sql(&self.complete(&model, &instructions, question.trim()).await?);
        }
        if looks_incomplete_sql(&sql) {
            return Err(LlmError::Incomplete(sql));
        }

        let sql = maybe_add_limit(&sql, context.row_cap);
        info!(model = %model, sql = %sql, "Generated SQL");
        Ok(GeneratedSql { sql, model })
    }

    /// Ask for a corrected statement given the engine's error
    pub async fn fix_sql(
        &self,
        question: &str,
        bad_sql: &str,
        engine_error: &str,
        context: &PromptContext,
    ) -> Result<String, LlmError> {
        let prompt = format!(
            "User question:\n{question}\n\nPrevious SQL (failed):\n{bad_sql}\n\n\
             Engine error:\n{engine_error}\n\nReturn a corrected SQL query only."
        );

        let model = self.config.default_model.clone();
        let fixed = normalize_sql(&self.complete(&model, &repair_instructions(context), &prompt).await?);
        let fixed = maybe_add_limit(&fixed, context.row_cap);
        if looks_incomplete_sql(&fixed) {
            return Err(LlmError::Incomplete(fixed));
        }

        info!(model = %model, sql = %fixed, "Repaired SQL");
        Ok(fixed)
    }

    async fn complete(&self, model: &str, system: &str, user: &str) -> Result<String, LlmError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user)
                    .build()?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .max_completion_tokens(self.config.max_tokens)
            .temperature(0.0)
            .build()?;

        let response = self.client.chat().create(request).await?;
        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(LlmError::EmptyResponse)
    }
}

fn table_lines(context: &PromptContext) -> String {
    context
        .allowed_tables
        .iter()
        .map(|t| format!("  - {t}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn generation_instructions(context: &PromptContext) -> String {
    format!(
        "You are a senior analytics engineer.\n\
         Write ONE DuckDB SQL query to answer the user.\n\n\
         Hard rules:\n\
         - Output SQL only. No markdown. No explanation. No trailing semicolon.\n\
         - Read-only: a single SELECT or WITH statement.\n\
         - Use fully-qualified table names (database.schema.table).\n\
         - Use ONLY these tables:\n{tables}\n\n\
         - Use ONLY columns that exist in the SCHEMA block. Do NOT invent columns.\n\
         - Do NOT use USING(...). Always use explicit ON conditions.\n\
         - If it could return many rows, add LIMIT {row_cap}.\n\n\
         {schema}",
        tables = table_lines(context),
        row_cap = context.row_cap,
        schema = context.schema_context,
    )
}

fn repair_instructions(context: &PromptContext) -> String {
    format!(
        "You are fixing a DuckDB SQL query.\n\n\
         Rules:\n\
         - Output SQL only. No markdown. No explanation. No trailing semicolon.\n\
         - Read-only: a single SELECT or WITH statement.\n\
         - Use fully-qualified table names (database.schema.table).\n\
         - Use ONLY these tables:\n{tables}\n\n\
         - Use ONLY columns that exist in the SCHEMA block. Do NOT invent columns.\n\
         - If it could return many rows, add LIMIT {row_cap}.\n\n\
         {schema}",
        tables = table_lines(context),
        row_cap = context.row_cap,
        schema = context.schema_context,
    )
}

/// Extract SQL from model output: unwrap a Markdown fence, drop trailing `;`
pub fn normalize_sql(text: &str) -> String {
    let mut sql = text.trim();

    if let Some(start) = sql.find("```") {
        let body = &sql[start + 3..];
        let body = body
            .get(..3)
            .filter(|tag| tag.eq_ignore_ascii_case("sql"))
            .map_or(body, |_| &body[3..]);
        sql = body.find("```").map_or(body, |end| &body[..end]);
    }

    sql.trim().trim_end_matches(';').trim().to_string()
}

/// Heuristic for truncated output
pub fn looks_incomplete_sql(sql: &str) -> bool {
    let sql = sql.trim();
    if sql.is_empty() || sql.contains('\u{FF1B}') || sql.ends_with(',') {
        return true;
    }
    if sql.matches('(').count() != sql.matches(')').count() {
        return true;
    }

    let last_word = sql
        .rsplit(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("");
    DANGLING_WORDS.iter().any(|w| last_word.eq_ignore_ascii_case(w))
}

/// Append `LIMIT row_cap` to statements likely to return many rows
pub fn maybe_add_limit(sql: &str, row_cap: usize) -> String {
    let sql = sql.trim();
    if has_word(sql, "limit") {
        return sql.to_string();
    }

    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let grouped = flat.contains(" group by ");
    let likely_multi = grouped || flat.contains(" order by ") || flat.contains(" join ");
    let scalar_agg = !grouped && AGGREGATE_CALLS.iter().any(|call| flat.contains(call));

    if likely_multi && !scalar_agg {
        format!("{}\nLIMIT {row_cap}", sql.trim_end_matches(';'))
    } else {
        sql.to_string()
    }
}
