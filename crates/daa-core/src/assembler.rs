//! Answer assembly
//!
//! Packages per-question answers into the response body according to the
//! plan's output shape. Keyed objects preserve question order; when two
//! questions share the same text the later answer overwrites the earlier one.

use crate::data::value_to_text;
use crate::stages::VISUALIZATION_PLACEHOLDER;
use crate::types::{OutputShape, TaskPlan};
use serde_json::{Map, Value};

/// Keys that look like they hold a chart
const CHART_KEY_HINTS: &[&str] = &["plot", "chart", "base64"];

/// Package `answers` for `plan`. Missing answers become `null`, extra ones are dropped.
#[must_use]
pub fn assemble(plan: &TaskPlan, mut answers: Vec<Value>) -> Value {
    answers.resize(plan.questions.len(), Value::Null);

    match plan.output_shape {
        OutputShape::OrderedArray => Value::Array(answers),
        OutputShape::KeyedObject => {
            let mut object = Map::new();
            for (question, answer) in plan.questions.iter().zip(answers) {
                object.insert(question.text.clone(), answer);
            }
            Value::Object(object)
        }
        OutputShape::FreeText => {
            if answers.len() == 1 {
                return answers.remove(0);
            }
            Value::String(
                answers
                    .iter()
                    .map(value_to_text)
                    .collect::<Vec<_>>()
                    .join("\n"),
            )
        }
    }
}

/// Replace chart placeholders with rendered payloads, in order.
///
/// When no placeholder is left for a chart, the last array element or the
/// first chart-like object key is used instead.
#[must_use]
pub fn substitute_charts(mut value: Value, charts: Vec<String>) -> Value {
    for chart in charts {
        if !replace_placeholder(&mut value, &chart) {
            tracing::debug!("No chart placeholder left, using fallback slot");
            replace_fallback(&mut value, chart);
        }
    }
    value
}

fn replace_placeholder(value: &mut Value, chart: &str) -> bool {
    match value {
        Value::String(s) if s == VISUALIZATION_PLACEHOLDER => {
            *s = chart.to_string();
            true
        }
        Value::String(s) if s.contains(VISUALIZATION_PLACEHOLDER) => {
            *s = s.replacen(VISUALIZATION_PLACEHOLDER, chart, 1);
            true
        }
        Value::Array(items) => items.iter_mut().any(|item| replace_placeholder(item, chart)),
        Value::Object(map) => map.values_mut().any(|item| replace_placeholder(item, chart)),
        _ => false,
    }
}

fn is_data_uri(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.starts_with("data:"))
}

fn replace_fallback(value: &mut Value, chart: String) {
    match value {
        Value::Array(items) => {
            if let Some(last) = items.last_mut() {
                if !is_data_uri(last) {
                    *last = Value::String(chart);
                }
            }
        }
        Value::Object(map) => {
            let slot = map.iter_mut().find(|(key, v)| {
                let key = key.to_lowercase();
                CHART_KEY_HINTS.iter().any(|hint| key.contains(hint)) && !is_data_uri(v)
            });
            if let Some((_, v)) = slot {
                *v = Value::String(chart);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnswerKind, ExpectedFormat, Question, TaskKind};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn plan(texts: &[&str], shape: OutputShape) -> TaskPlan {
        TaskPlan {
            kind: TaskKind::Unclassified,
            data_source: None,
            processing_steps: vec![],
            questions: texts
                .iter()
                .map(|t| Question::new(*t, AnswerKind::Text, ExpectedFormat::String))
                .collect(),
            output_shape: shape,
            raw_text: texts.join("\n"),
        }
    }

    #[test]
    fn keyed_object_later_duplicate_wins() {
        let p = plan(&["a", "b", "a"], OutputShape::KeyedObject);
        let out = assemble(&p, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(out, json!({"a": 3, "b": 2}));
    }

    #[test]
    fn free_text_single_and_multiple() {
        let single = plan(&["q"], OutputShape::FreeText);
        assert_eq!(assemble(&single, vec![json!(7)]), json!(7));
        let multi = plan(&["q1", "q2"], OutputShape::FreeText);
        assert_eq!(assemble(&multi, vec![json!("x"), json!(2)]), json!("x\n2"));
    }

    #[test]
    fn missing_answers_are_null() {
        let p = plan(&["a", "b"], OutputShape::OrderedArray);
        assert_eq!(assemble(&p, vec![json!(1)]), json!([1, null]));
    }

    #[test]
    fn placeholders_are_substituted_in_order() {
        let value = json!(["x", VISUALIZATION_PLACEHOLDER, VISUALIZATION_PLACEHOLDER]);
        let out = substitute_charts(value, vec!["data:1".into(), "data:2".into()]);
        assert_eq!(out, json!(["x", "data:1", "data:2"]));
    }

    #[test]
    fn fallback_replaces_last_element() {
        let out = substitute_charts(json!(["a", "pending"]), vec!["data:img".into()]);
        assert_eq!(out, json!(["a", "data:img"]));
    }

    #[test]
    fn fallback_uses_chart_like_key() {
        let value = json!({"How many?": 3, "Scatter plot of x": "n/a"});
        let out = substitute_charts(value, vec!["data:img".into()]);
        assert_eq!(out["Scatter plot of x"], json!("data:img"));
        assert_eq!(out["How many?"], json!(3));
    }

    proptest! {
        #[test]
        fn prop_ordered_array_preserves_length_and_order(values in prop::collection::vec(any::<i64>(), 1..20)) {
            let texts: Vec<String> = (0..values.len()).map(|i| format!("q{i}")).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let p = plan(&refs, OutputShape::OrderedArray);
            let answers: Vec<Value> = values.iter().map(|v| json!(v)).collect();
            prop_assert_eq!(assemble(&p, answers.clone()), Value::Array(answers));
        }
    }
}
