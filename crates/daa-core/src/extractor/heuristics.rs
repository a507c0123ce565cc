//! Deterministic pattern matching over task text
//!
//! Keyword tables are scanned in a fixed order and the first match wins.
//! The order is load-bearing: overlapping questions ("count the points in the
//! plot") classify by whichever table is consulted first.

use crate::types::{AnswerKind, DataSource, ExpectedFormat, OutputShape, TaskKind};
use once_cell::sync::Lazy;
use regex::Regex;

static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>`\]]+"#).expect("valid regex"));

// Keywords are matched in upper case only so prose like "select the row from" stays text.
static QUERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\bSELECT\b.+?\bFROM\b.+?;").expect("valid regex"));

static FILE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[\s`'(])((?:[\w.\-]+/)*[\w.\-]+\.(?:csv|json|parquet))\b").expect("valid regex")
});

static NUMBERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(\d{1,3})\.[ \t]+").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Answer-kind keyword tables in precedence order
const ANSWER_KIND_KEYWORDS: &[(AnswerKind, &[&str])] = &[
    (AnswerKind::Count, &["how many", "count", "number of"]),
    (AnswerKind::Correlation, &["correlation", "relationship"]),
    (AnswerKind::Visualization, VISUALIZATION_KEYWORDS),
    (AnswerKind::Calculation, &["calculate", "compute", "average", "sum"]),
    (AnswerKind::Comparison, &["compare", "versus", "vs"]),
    (AnswerKind::Date, &["date", "time", "when", "earliest", "latest"]),
];

/// Words that mark a question as asking for a chart
pub(crate) const VISUALIZATION_KEYWORDS: &[&str] = &["plot", "chart", "graph", "visualization"];

const IMAGE_KEYWORDS: &[&str] = &[
    "base64", "base-64", "data uri", "image", "png", "webp", "plot", "chart", "graph",
    "visualization",
];
const NUMERIC_KEYWORDS: &[&str] = &[
    "how many", "count", "number of", "correlation", "average", "mean", "sum", "total",
    "percentage", "calculate", "compute",
];
const LIST_KEYWORDS: &[&str] = &["list", "array", "which ones", "all the"];
const BOOLEAN_KEYWORDS: &[&str] = &["true or false", "yes or no", "whether", "is there", "are there"];

/// First absolute URL in the text, trailing punctuation removed.
///
/// A `)` stays part of the URL only while it closes a `(` opened inside it.
#[must_use]
pub fn detect_url(text: &str) -> Option<String> {
    URL.find(text).map(|m| {
        let mut depth = 0usize;
        let mut end = m.as_str().len();
        for (i, c) in m.as_str().char_indices() {
            match c {
                '(' => depth += 1,
                ')' if depth == 0 => {
                    end = i;
                    break;
                }
                ')' => depth -= 1,
                _ => {}
            }
        }
        m.as_str()[..end]
            .trim_end_matches(['.', ',', ';', ':', '!', '?'])
            .to_string()
    })
}

/// First `SELECT ... FROM ... ;` fragment
#[must_use]
pub fn detect_query(text: &str) -> Option<String> {
    QUERY.find(text).map(|m| m.as_str().trim().to_string())
}

/// First local data file reference
#[must_use]
pub fn detect_file(text: &str) -> Option<String> {
    FILE_REF
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .find(|path| !path.contains("://"))
}

/// Resolve the data source and task kind.
///
/// A query fragment wins over a URL when both are present; a file reference
/// is only considered when neither is.
#[must_use]
pub fn detect_source(text: &str) -> (TaskKind, Option<DataSource>) {
    if let Some(query) = detect_query(text) {
        return (TaskKind::StructuredQuery, Some(DataSource::Query(query)));
    }
    if let Some(url) = detect_url(text) {
        return (TaskKind::WebScrape, Some(DataSource::Web(url)));
    }
    if let Some(path) = detect_file(text) {
        return (TaskKind::StructuredQuery, Some(DataSource::File(path)));
    }
    (TaskKind::Unclassified, None)
}

/// Collapse runs of whitespace into single spaces
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Texts of the enumerated sub-questions, in order. Each item runs until
/// the next item marker or the end of the text.
#[must_use]
pub fn split_numbered(text: &str) -> Vec<String> {
    let starts: Vec<(usize, usize)> = NUMBERED
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &(_, body_start))| {
            let end = starts.get(i + 1).map_or(text.len(), |next| next.0);
            normalize_whitespace(&text[body_start..end])
        })
        .filter(|q| !q.is_empty())
        .collect()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Answer kind by keyword precedence
#[must_use]
pub fn classify_answer_kind(question: &str) -> AnswerKind {
    let lower = question.to_lowercase();
    ANSWER_KIND_KEYWORDS
        .iter()
        .find(|(_, keywords)| contains_any(&lower, keywords))
        .map_or(AnswerKind::Text, |(kind, _)| *kind)
}

/// Expected format by a scan independent of the answer kind
#[must_use]
pub fn classify_expected_format(question: &str) -> ExpectedFormat {
    let lower = question.to_lowercase();
    if contains_any(&lower, IMAGE_KEYWORDS) {
        ExpectedFormat::Base64Image
    } else if contains_any(&lower, NUMERIC_KEYWORDS) {
        ExpectedFormat::Number
    } else if contains_any(&lower, LIST_KEYWORDS) {
        ExpectedFormat::Array
    } else if contains_any(&lower, BOOLEAN_KEYWORDS) {
        ExpectedFormat::Boolean
    } else {
        ExpectedFormat::String
    }
}

/// Whether the question mentions a chart
#[must_use]
pub fn mentions_visualization(question: &str) -> bool {
    contains_any(&question.to_lowercase(), VISUALIZATION_KEYWORDS)
}

/// Output packaging requested by the task; keyed object is checked first
#[must_use]
pub fn detect_output_shape(text: &str) -> OutputShape {
    let lower = text.to_lowercase();
    if lower.contains("json object") {
        OutputShape::KeyedObject
    } else {
        OutputShape::OrderedArray
    }
}
