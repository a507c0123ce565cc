//! Numeric helpers shared by transformation, answering and chart rendering

use crate::data::{find_field, Record};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?\d[\d,]*(?:\.\d+)?|[-+]?\.\d+").expect("valid regex"));

static MONEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$\s*(\d[\d,]*(?:\.\d+)?)\s*(billion|bn|million|mn|m\b)?")
        .expect("valid regex")
});

static SCALED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(billion|bn|million|mn)\b").expect("valid regex")
});

/// Parse a whole cell as a float: plain numbers, thousands separators, and
/// a leading currency sign are accepted, anything else is rejected
#[must_use]
pub fn parse_strict(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches('$')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// First numeric token inside a cell ("24RK" -> 24, "1997[a]" -> 1997)
#[must_use]
pub fn parse_lenient(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => LEADING_NUMBER
            .find(s)
            .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
            .filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Monetary cell in millions of dollars.
///
/// Amounts written with a scale word are scaled; bare amounts of at least
/// 100000 are taken as dollars, smaller ones as already in millions.
#[must_use]
pub fn parse_money_millions(value: &Value) -> Option<f64> {
    let text = match value {
        Value::Number(n) => return n.as_f64().map(dollars_or_millions),
        Value::String(s) => s.as_str(),
        _ => return None,
    };
    let caps = MONEY.captures(text).or_else(|| SCALED.captures(text))?;
    let amount: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(unit) if unit == "billion" || unit == "bn" => Some(amount * 1_000.0),
        Some(_) => Some(amount),
        None => Some(dollars_or_millions(amount)),
    }
}

fn dollars_or_millions(amount: f64) -> f64 {
    if amount >= 100_000.0 {
        amount / 1_000_000.0
    } else {
        amount
    }
}

/// Paired numeric values of two fields; records missing either side are skipped
#[must_use]
pub fn paired_columns(records: &[Record], x_field: &str, y_field: &str) -> Vec<(f64, f64)> {
    records
        .iter()
        .filter_map(|r| {
            let x = find_field(r, x_field).and_then(parse_lenient)?;
            let y = find_field(r, y_field).and_then(parse_lenient)?;
            Some((x, y))
        })
        .collect()
}

/// Pearson correlation coefficient; `None` with fewer than two points or
/// zero variance on either side
#[must_use]
pub fn pearson(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Least-squares fit `y = slope * x + intercept`
#[must_use]
pub fn linear_regression(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

/// Round half away from zero to `places` decimals
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// JSON number for a float, integral values become integers
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        return Value::from(value as i64);
    }
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_parse_rejects_trailing_text() {
        assert_eq!(parse_strict(&json!("10")), Some(10.0));
        assert_eq!(parse_strict(&json!("$1,200.5")), Some(1200.5));
        assert_eq!(parse_strict(&json!("10 apples")), None);
        assert_eq!(parse_strict(&json!("")), None);
    }

    #[test]
    fn lenient_parse_takes_first_token() {
        assert_eq!(parse_lenient(&json!("24RK")), Some(24.0));
        assert_eq!(parse_lenient(&json!("1997[a]")), Some(1997.0));
        assert_eq!(parse_lenient(&json!("n/a")), None);
    }

    #[test]
    fn money_in_millions() {
        assert_eq!(parse_money_millions(&json!("$2,923,706,026")).map(|v| v.round()), Some(2924.0));
        assert_eq!(parse_money_millions(&json!("T$2,257,844,554")).map(|v| v.round()), Some(2258.0));
        assert_eq!(parse_money_millions(&json!("$1.5 billion")), Some(1500.0));
        assert_eq!(parse_money_millions(&json!("2.1 bn")), Some(2100.0));
        assert_eq!(parse_money_millions(&json!(2500)), Some(2500.0));
        assert_eq!(parse_money_millions(&json!("unknown")), None);
    }

    #[test]
    fn pearson_matches_reference_value() {
        let points: Vec<(f64, f64)> = vec![(1.0, 1.0), (2.0, 1.0), (3.0, 1.0), (4.0, 2.0), (5.0, 3.0)];
        let r = pearson(&points).unwrap();
        assert!((round_to(r, 6) - 0.883_883).abs() < 1e-9);
    }

    #[test]
    fn pearson_degenerate_inputs() {
        assert_eq!(pearson(&[(1.0, 1.0)]), None);
        assert_eq!(pearson(&[(1.0, 1.0), (2.0, 1.0)]), None);
    }

    #[test]
    fn regression_fits_line() {
        let (slope, intercept) = linear_regression(&[(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)]).unwrap();
        assert!((slope - 2.0).abs() < 1e-12);
        assert!((intercept - 1.0).abs() < 1e-12);
    }

    #[test]
    fn number_value_prefers_integers() {
        assert_eq!(number_value(3.0), json!(3));
        assert_eq!(number_value(0.5), json!(0.5));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }
}
