//! Transformation stage: apply processing steps in order
//!
//! Each step consumes the previous step's dataset and returns a new one.
//! Steps never fail the pipeline: missing parameters, unknown operators and
//! datasets without records all pass the input through unchanged.

use crate::data::{find_field, value_to_text, Record, StageResult};
use crate::stats::{number_value, parse_lenient, parse_strict};
use crate::types::{ProcessingStep, StepOperation};
use chrono::NaiveDate;
use serde_json::Value;
use std::cmp::Ordering;

/// Apply every step in order
#[must_use]
pub fn apply_all(steps: &[ProcessingStep], data: StageResult) -> StageResult {
    steps.iter().fold(data, |current, step| apply(step, &current))
}

/// Apply one step
#[must_use]
pub fn apply(step: &ProcessingStep, data: &StageResult) -> StageResult {
    let records = data.records();
    if records.is_empty() {
        return data.clone();
    }

    let out = match &step.operation {
        StepOperation::Filter => filter(step, records),
        StepOperation::Transform => transform(step, records),
        StepOperation::Aggregate => aggregate(step, records),
        StepOperation::Sort => sort(step, records),
        StepOperation::Calculate => calculate(step, records),
        StepOperation::Join => {
            tracing::warn!("Join steps are not implemented; passing data through");
            None
        }
        StepOperation::Other(name) => {
            tracing::warn!("Unknown processing step '{}'; passing data through", name);
            None
        }
    };

    match out {
        Some(records) => StageResult::Records(records),
        None => data.clone(),
    }
}

fn field_value<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    record.get(field).or_else(|| find_field(record, field))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    StartsWith,
    EndsWith,
}

impl Comparison {
    fn parse(op: &str) -> Option<Self> {
        match op.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "equals" | "eq" | "=" | "==" => Some(Self::Equals),
            "not_equals" | "ne" | "!=" | "<>" => Some(Self::NotEquals),
            "greater_than" | "gt" | ">" => Some(Self::GreaterThan),
            "less_than" | "lt" | "<" => Some(Self::LessThan),
            "contains" => Some(Self::Contains),
            "starts_with" => Some(Self::StartsWith),
            "ends_with" => Some(Self::EndsWith),
            _ => None,
        }
    }

    fn matches(self, actual: Option<&Value>, expected: &str) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        let expected_value = Value::String(expected.to_string());
        let numeric = parse_strict(actual).zip(parse_strict(&expected_value));
        let actual_text = value_to_text(actual).to_lowercase();
        let expected_text = expected.to_lowercase();
        match self {
            Self::Equals => numeric.map_or(actual_text == expected_text, |(a, b)| a == b),
            Self::NotEquals => numeric.map_or(actual_text != expected_text, |(a, b)| a != b),
            Self::GreaterThan => numeric.is_some_and(|(a, b)| a > b),
            Self::LessThan => numeric.is_some_and(|(a, b)| a < b),
            Self::Contains => actual_text.contains(&expected_text),
            Self::StartsWith => actual_text.starts_with(&expected_text),
            Self::EndsWith => actual_text.ends_with(&expected_text),
        }
    }
}

fn filter(step: &ProcessingStep, records: Vec<Record>) -> Option<Vec<Record>> {
    let field = step.str_param(&["field", "column"])?;
    let op = Comparison::parse(&step.str_param(&["operator", "op", "condition"]).unwrap_or_else(|| "equals".into()))?;
    let expected = step.str_param(&["value"])?;
    Some(
        records
            .into_iter()
            .filter(|r| op.matches(field_value(r, &field), &expected))
            .collect(),
    )
}

fn to_date(value: &Value) -> Value {
    const FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%Y/%m/%d"];
    let text = value_to_text(value);
    let text = text.trim();
    FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
        .or_else(|| {
            text.parse::<i32>()
                .ok()
                .filter(|y| (1000..=9999).contains(y))
                .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
        })
        .map_or(Value::Null, |d| Value::String(d.format("%Y-%m-%d").to_string()))
}

fn transform(step: &ProcessingStep, records: Vec<Record>) -> Option<Vec<Record>> {
    let field = step.str_param(&["field", "column"])?;
    let operation = step.str_param(&["operation", "function", "to"])?.to_lowercase().replace(['-', ' '], "_");
    let target = step.str_param(&["new_field", "target", "as"]).unwrap_or_else(|| field.clone());

    let map: fn(&Value) -> Value = match operation.as_str() {
        "to_number" | "number" => |v| parse_lenient(v).map_or(Value::Null, number_value),
        "to_string" | "string" => |v| Value::String(value_to_text(v)),
        "to_date" | "date" => to_date,
        "uppercase" | "upper" => |v| Value::String(value_to_text(v).to_uppercase()),
        "lowercase" | "lower" => |v| Value::String(value_to_text(v).to_lowercase()),
        "trim" => |v| Value::String(value_to_text(v).trim().to_string()),
        other => {
            tracing::warn!("Unknown transform operation '{}'", other);
            return None;
        }
    };

    Some(
        records
            .into_iter()
            .map(|mut r| {
                let mapped = field_value(&r, &field).map_or(Value::Null, map);
                r.insert(target.clone(), mapped);
                r
            })
            .collect(),
    )
}

#[derive(Debug, Clone, Copy)]
enum Reduction {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl Reduction {
    fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "sum" | "total" => Some(Self::Sum),
            "avg" | "average" | "mean" => Some(Self::Avg),
            "min" | "minimum" => Some(Self::Min),
            "max" | "maximum" => Some(Self::Max),
            "count" => Some(Self::Count),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
        }
    }

    fn reduce(self, records: &[&Record], field: Option<&str>) -> Value {
        let numbers = || -> Option<Vec<f64>> {
            let field = field?;
            let values: Vec<f64> = records
                .iter()
                .filter_map(|r| field_value(r, field).and_then(parse_lenient))
                .collect();
            (!values.is_empty()).then_some(values)
        };
        #[allow(clippy::cast_precision_loss)]
        let result = match self {
            Self::Count => {
                let n = match field {
                    Some(f) => records
                        .iter()
                        .filter(|r| field_value(r, f).is_some_and(|v| !v.is_null()))
                        .count(),
                    None => records.len(),
                };
                return Value::from(n);
            }
            Self::Sum => numbers().map(|v| v.iter().sum::<f64>()),
            Self::Avg => numbers().map(|v| v.iter().sum::<f64>() / v.len() as f64),
            Self::Min => numbers().map(|v| v.into_iter().fold(f64::INFINITY, f64::min)),
            Self::Max => numbers().map(|v| v.into_iter().fold(f64::NEG_INFINITY, f64::max)),
        };
        result.map_or(Value::Null, number_value)
    }
}

fn aggregate(step: &ProcessingStep, records: Vec<Record>) -> Option<Vec<Record>> {
    let reduction = Reduction::parse(&step.str_param(&["function", "operation", "agg"])?)?;
    let field = step.str_param(&["field", "column"]);
    let output_name = field
        .as_ref()
        .map_or_else(|| reduction.name().to_string(), |f| format!("{}_{f}", reduction.name()));

    let Some(group_by) = step.str_param(&["group_by", "by"]) else {
        let all: Vec<&Record> = records.iter().collect();
        let mut out = Record::new();
        out.insert(output_name, reduction.reduce(&all, field.as_deref()));
        return Some(vec![out]);
    };

    let mut groups: Vec<(String, Value, Vec<&Record>)> = Vec::new();
    for record in &records {
        let key_value = field_value(record, &group_by).cloned().unwrap_or(Value::Null);
        let key = value_to_text(&key_value);
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, members)) => members.push(record),
            None => groups.push((key, key_value, vec![record])),
        }
    }

    Some(
        groups
            .into_iter()
            .map(|(_, key_value, members)| {
                let mut out = Record::new();
                out.insert(group_by.clone(), key_value);
                out.insert(output_name.clone(), reduction.reduce(&members, field.as_deref()));
                out
            })
            .collect(),
    )
}

/// Numbers order numerically and come before text; text orders
/// case-insensitively. Keeps the comparator total for mixed columns.
fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let num = |v: Option<&Value>| v.and_then(parse_strict);
    match (num(a), num(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => {
            let text = |v: Option<&Value>| v.map(value_to_text).unwrap_or_default().to_lowercase();
            text(a).cmp(&text(b))
        }
    }
}

fn sort(step: &ProcessingStep, mut records: Vec<Record>) -> Option<Vec<Record>> {
    let field = step.str_param(&["field", "column", "by"])?;
    let descending = step
        .str_param(&["order", "direction"])
        .is_some_and(|o| o.to_lowercase().starts_with("desc"))
        || step.params.get("ascending") == Some(&Value::Bool(false));

    records.sort_by(|a, b| {
        let ord = compare_cells(field_value(a, &field), field_value(b, &field));
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    Some(records)
}

fn calculate(step: &ProcessingStep, records: Vec<Record>) -> Option<Vec<Record>> {
    let left = step.str_param(&["field1", "left", "a"])?;
    let right = step.str_param(&["field2", "right", "b"])?;
    let operation = step.str_param(&["operation", "op"])?.to_lowercase();
    let target = step
        .str_param(&["new_field", "target", "as"])
        .unwrap_or_else(|| "result".to_string());

    let op: fn(f64, f64) -> f64 = match operation.as_str() {
        "add" | "+" | "plus" => |a, b| a + b,
        "subtract" | "-" | "minus" => |a, b| a - b,
        "multiply" | "*" | "times" => |a, b| a * b,
        "divide" | "/" => |a, b| if b == 0.0 { 0.0 } else { a / b },
        other => {
            tracing::warn!("Unknown calculate operation '{}'", other);
            return None;
        }
    };

    Some(
        records
            .into_iter()
            .map(|mut r| {
                let a = field_value(&r, &left).and_then(parse_lenient);
                let b = field_value(&r, &right).and_then(parse_lenient);
                let value = a.zip(b).map_or(Value::Null, |(a, b)| number_value(op(a, b)));
                r.insert(target.clone(), value);
                r
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn column_text(data: &StageResult, field: &str) -> Vec<String> {
        data.records()
            .iter()
            .map(|r| field_value(r, field).map(value_to_text).unwrap_or_default())
            .collect()
    }

    fn records(values: Value) -> StageResult {
        let list = values
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_object().cloned())
                    .collect()
            })
            .unwrap_or_default();
        StageResult::Records(list)
    }

    #[test]
    fn sort_prefers_numeric_comparison() {
        let data = records(json!([{"v": "10"}, {"v": "2"}, {"v": "1"}]));
        let step = ProcessingStep::new(StepOperation::Sort).with_param("field", "v");
        assert_eq!(column_text(&apply(&step, &data), "v"), vec!["1", "2", "10"]);
    }

    #[test]
    fn sort_descending_and_lexical_fallback() {
        let data = records(json!([{"n": "beta"}, {"n": "Alpha"}, {"n": "gamma"}]));
        let step = ProcessingStep::new(StepOperation::Sort)
            .with_param("field", "n")
            .with_param("order", "desc");
        assert_eq!(column_text(&apply(&step, &data), "n"), vec!["gamma", "beta", "Alpha"]);
    }

    #[test]
    fn calculate_divide_by_zero_is_zero() {
        let data = records(json!([{"a": 10, "b": 0}]));
        let step = ProcessingStep::new(StepOperation::Calculate)
            .with_param("field1", "a")
            .with_param("field2", "b")
            .with_param("operation", "divide")
            .with_param("new_field", "ratio");
        let out = apply(&step, &data).records();
        assert_eq!(out[0]["ratio"], json!(0));
    }

    #[test]
    fn calculate_multiplies() {
        let data = records(json!([{"a": "3", "b": 2.5}]));
        let step = ProcessingStep::new(StepOperation::Calculate)
            .with_param("left", "a")
            .with_param("right", "b")
            .with_param("operation", "multiply");
        assert_eq!(apply(&step, &data).records()[0]["result"], json!(7.5));
    }

    #[test]
    fn filter_numeric_and_string_operators() {
        let data = records(json!([
            {"title": "Avatar", "year": "2009"},
            {"title": "Titanic", "year": "1997"},
            {"title": "avengers", "year": "2019"}
        ]));
        let gt = ProcessingStep::new(StepOperation::Filter)
            .with_param("field", "year")
            .with_param("operator", "greater_than")
            .with_param("value", "2000");
        assert_eq!(column_text(&apply(&gt, &data), "title"), vec!["Avatar", "avengers"]);

        let starts = ProcessingStep::new(StepOperation::Filter)
            .with_param("field", "title")
            .with_param("operator", "starts-with")
            .with_param("value", "AV");
        assert_eq!(apply(&starts, &data).records().len(), 2);

        let eq = ProcessingStep::new(StepOperation::Filter)
            .with_param("field", "title")
            .with_param("operator", "equals")
            .with_param("value", "TITANIC");
        assert_eq!(column_text(&apply(&eq, &data), "year"), vec!["1997"]);
    }

    #[test]
    fn transform_writes_new_field() {
        let data = records(json!([{"name": "  ada "}]));
        let step = ProcessingStep::new(StepOperation::Transform)
            .with_param("field", "name")
            .with_param("operation", "trim")
            .with_param("new_field", "clean");
        let out = apply(&step, &data).records();
        assert_eq!(out[0]["clean"], json!("ada"));
        assert_eq!(out[0]["name"], json!("  ada "));
    }

    #[test]
    fn transform_to_date_normalises() {
        let data = records(json!([{"d": "March 5, 2021"}, {"d": "nonsense"}]));
        let step = ProcessingStep::new(StepOperation::Transform)
            .with_param("field", "d")
            .with_param("operation", "to_date");
        let out = apply(&step, &data).records();
        assert_eq!(out[0]["d"], json!("2021-03-05"));
        assert_eq!(out[1]["d"], Value::Null);
    }

    #[test]
    fn aggregate_single_and_grouped() {
        let data = records(json!([
            {"region": "north", "sales": 10},
            {"region": "south", "sales": 5},
            {"region": "north", "sales": "$2"}
        ]));
        let sum = ProcessingStep::new(StepOperation::Aggregate)
            .with_param("function", "sum")
            .with_param("field", "sales");
        assert_eq!(apply(&sum, &data).records()[0]["sum_sales"], json!(17));

        let grouped = sum.clone().with_param("group_by", "region");
        let out = apply(&grouped, &data).records();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["region"], json!("north"));
        assert_eq!(out[0]["sum_sales"], json!(12));
        assert_eq!(out[1]["sum_sales"], json!(5));
    }

    #[test]
    fn sort_puts_numbers_before_text_in_mixed_columns() {
        let data = records(json!([{"v": "-"}, {"v": "10"}, {"v": "(n/a)"}, {"v": "2"}]));
        let step = ProcessingStep::new(StepOperation::Sort).with_param("field", "v");
        assert_eq!(column_text(&apply(&step, &data), "v"), vec!["2", "10", "(n/a)", "-"]);
    }

    #[test]
    fn filter_remaining_operators() {
        let data = records(json!([
            {"title": "Avatar", "year": "2009"},
            {"title": "Titanic", "year": "1997"},
            {"title": "avengers", "year": "2019"}
        ]));
        let cases = [
            ("not-equals", "title", "TITANIC", vec!["Avatar", "avengers"]),
            ("less_than", "year", "2000", vec!["Titanic"]),
            ("contains", "title", "TAN", vec!["Titanic"]),
            ("ends_with", "title", "R", vec!["Avatar"]),
        ];
        for (operator, field, value, expected) in cases {
            let step = ProcessingStep::new(StepOperation::Filter)
                .with_param("field", field)
                .with_param("operator", operator)
                .with_param("value", value);
            assert_eq!(column_text(&apply(&step, &data), "title"), expected, "{operator}");
        }
    }

    #[test]
    fn transform_operations_in_place() {
        let cases = [
            ("to-number", json!("42 units"), json!(42)),
            ("to_number", json!("n/a"), Value::Null),
            ("to-string", json!(7), json!("7")),
            ("uppercase", json!("Ada Lovelace"), json!("ADA LOVELACE")),
            ("lowercase", json!("Ada Lovelace"), json!("ada lovelace")),
        ];
        for (operation, input, expected) in cases {
            let data = records(json!([{ "v": input }]));
            let step = ProcessingStep::new(StepOperation::Transform)
                .with_param("field", "v")
                .with_param("operation", operation);
            assert_eq!(apply(&step, &data).records()[0]["v"], expected, "{operation}");
        }
    }

    #[test]
    fn aggregate_reductions() {
        let data = records(json!([
            {"region": "north", "sales": 10},
            {"region": "south", "sales": 4},
            {"region": "north", "sales": "$1"},
            {"region": "south", "sales": null}
        ]));
        let cases = [
            ("avg", json!(5), json!(5.5), json!(4)),
            ("min", json!(1), json!(1), json!(4)),
            ("max", json!(10), json!(10), json!(4)),
            ("count", json!(3), json!(2), json!(1)),
        ];
        for (function, overall, north, south) in cases {
            let step = ProcessingStep::new(StepOperation::Aggregate)
                .with_param("function", function)
                .with_param("field", "sales");
            let key = format!("{function}_sales");
            assert_eq!(apply(&step, &data).records()[0][&key], overall, "{function}");

            let out = apply(&step.with_param("group_by", "region"), &data).records();
            assert_eq!(out.len(), 2);
            assert_eq!(out[0][&key], north, "{function} north");
            assert_eq!(out[1][&key], south, "{function} south");
        }
    }

    #[test]
    fn aggregate_count_without_field_counts_records() {
        let data = records(json!([{"a": 1}, {"a": null}, {"b": 2}]));
        let step = ProcessingStep::new(StepOperation::Aggregate).with_param("function", "count");
        assert_eq!(apply(&step, &data).records()[0]["count"], json!(3));
    }

    #[test]
    fn calculate_add_and_subtract() {
        let data = records(json!([{"a": "3", "b": 2.5}, {"a": "x", "b": 1}]));
        let cases = [("add", json!(5.5)), ("subtract", json!(0.5))];
        for (operation, expected) in cases {
            let step = ProcessingStep::new(StepOperation::Calculate)
                .with_param("field1", "a")
                .with_param("field2", "b")
                .with_param("operation", operation)
                .with_param("new_field", "out");
            let out = apply(&step, &data).records();
            assert_eq!(out[0]["out"], expected, "{operation}");
            assert_eq!(out[1]["out"], Value::Null);
        }
    }

    #[test]
    fn join_and_unknown_steps_pass_through() {
        let data = records(json!([{"a": 1}]));
        assert_eq!(apply(&ProcessingStep::new(StepOperation::Join), &data), data);
        assert_eq!(
            apply(&ProcessingStep::new(StepOperation::Other("pivot".into())), &data),
            data
        );
    }

    #[test]
    fn steps_on_no_data_yield_no_data() {
        let step = ProcessingStep::new(StepOperation::Sort).with_param("field", "x");
        assert_eq!(apply_all(&[step], StageResult::None), StageResult::None);
    }

    #[test]
    fn missing_parameters_pass_through() {
        let data = records(json!([{"a": 1}]));
        assert_eq!(apply(&ProcessingStep::new(StepOperation::Filter), &data), data);
    }
}
