//! Prompt templates sent to the language model

use crate::data::{value_to_text, StageResult};
use crate::types::{AnswerKind, Question};
use std::fmt::Write;

/// Prompt asking for a JSON-shaped task plan
#[must_use]
pub fn plan_extraction(task_text: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You convert data analysis task descriptions into a JSON plan. Return ONLY one JSON object.\n\n",
    );
    prompt.push_str("Schema:\n");
    prompt.push_str(
        r#"{"kind":"web-scrape|structured-query|mixed|unclassified","data_source":{"type":"web|query|file","value":"..."}|null,"processing_steps":[{"operation":"filter|transform|aggregate|sort|join|calculate","params":{}}],"questions":[{"text":"...","answer_kind":"count|calculation|correlation|visualization|comparison|text|date","expected_format":"number|string|boolean|array|object|base64-image"}],"output_shape":"ordered-array|keyed-object|free-text"}"#,
    );
    prompt.push_str("\n\nRules:\n");
    prompt.push_str("1) Copy every question text verbatim, in the order it appears.\n");
    prompt.push_str("2) Use data_source null and kind unclassified when no URL, query or file is given.\n");
    prompt.push_str("3) Charts use answer_kind visualization and expected_format base64-image.\n");
    prompt.push_str("\nTask:\n");
    prompt.push_str(task_text.trim());
    prompt.push('\n');
    prompt
}

fn role_instruction(kind: AnswerKind) -> &'static str {
    match kind {
        AnswerKind::Count => {
            "You count things in data. Reply with the count as a single number and nothing else."
        }
        AnswerKind::Calculation => {
            "You compute values from data. Reply with the final numeric result only."
        }
        AnswerKind::Correlation => {
            "You are a statistician. Reply with the correlation coefficient as a decimal number only."
        }
        AnswerKind::Comparison => {
            "You compare items in data. Reply with a short, direct comparison."
        }
        AnswerKind::Date => {
            "You find dates in data. Reply with the date only, formatted YYYY-MM-DD when possible."
        }
        AnswerKind::Visualization | AnswerKind::Text => {
            "You are a data analyst. Answer the question concisely using the data provided."
        }
    }
}

/// Role-specific answering prompt with a bounded view of the current dataset
#[must_use]
pub fn answer_question(
    question: &Question,
    data: &StageResult,
    task_text: &str,
    max_rows: usize,
    max_chars: usize,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(role_instruction(question.answer_kind));
    prompt.push_str("\n\n");

    let records = data.records();
    if !records.is_empty() {
        let columns = data.columns();
        let _ = writeln!(prompt, "Data ({} rows, columns: {}):", records.len(), columns.join(", "));
        for record in records.iter().take(max_rows) {
            let cells: Vec<String> = columns
                .iter()
                .map(|c| record.get(c).map(value_to_text).unwrap_or_default())
                .collect();
            let _ = writeln!(prompt, "| {} |", cells.join(" | "));
        }
        if records.len() > max_rows {
            let _ = writeln!(prompt, "... {} more rows", records.len() - max_rows);
        }
        prompt.push('\n');
    }
    if let Some(text) = data.text() {
        let excerpt: String = text.chars().take(max_chars).collect();
        let _ = writeln!(prompt, "Page text:\n{excerpt}\n");
    }
    if data.is_empty() {
        let _ = writeln!(prompt, "Task context:\n{}\n", task_text.trim());
    }
    let _ = writeln!(prompt, "Question: {}", question.text);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Table;
    use crate::types::ExpectedFormat;
    use serde_json::json;

    #[test]
    fn extraction_prompt_embeds_task() {
        let prompt = plan_extraction("  1. How many rows?  ");
        assert!(prompt.contains("Return ONLY one JSON object"));
        assert!(prompt.ends_with("1. How many rows?\n"));
    }

    #[test]
    fn answer_prompt_is_role_specific() {
        let q = Question::new("How many?", AnswerKind::Count, ExpectedFormat::Number);
        let prompt = answer_question(&q, &StageResult::None, "task", 5, 100);
        assert!(prompt.starts_with("You count things"));
        assert!(prompt.contains("Task context:\ntask"));
        assert!(prompt.trim_end().ends_with("Question: How many?"));
    }

    #[test]
    fn answer_prompt_truncates_rows() {
        let table = Table::new(
            vec!["n".into()],
            (0..10).map(|i| vec![json!(i)]).collect(),
        );
        let q = Question::new("Sum?", AnswerKind::Calculation, ExpectedFormat::Number);
        let prompt = answer_question(&q, &StageResult::Tabular(table), "task", 3, 100);
        assert!(prompt.contains("Data (10 rows, columns: n)"));
        assert!(prompt.contains("... 7 more rows"));
        assert!(!prompt.contains("Task context"));
    }
}
