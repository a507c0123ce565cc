//! Chart directives embedded in a question

use crate::types::{ChartType, LineStyle, VisualizationSpec};
use once_cell::sync::Lazy;
use regex::Regex;

static COLOR_BEFORE_REGRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([a-z]+)[\s-]+regression\b").expect("valid regex"));

static AXIS_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s+and\s+([A-Za-z_][A-Za-z0-9_]*)\b").expect("valid regex")
});

static DIMENSIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{2,4})\s*[x×]\s*(\d{2,4})\b").expect("valid regex"));

static BYTE_BUDGET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:under|less than|below|within|max(?:imum)?(?: of)?)\s+(\d[\d,]*)\s*(?:bytes|b\b)")
        .expect("valid regex")
});

/// Words that never name an axis field or a colour
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "it", "them", "this", "that", "plot", "chart", "graph", "draw", "scatter",
    "scatterplot", "line", "bar", "along", "with", "of", "between", "return", "encode", "label",
    "title", "axis", "axes", "x", "y", "dotted", "dashed", "solid", "thin", "thick",
];

/// Parse chart type, regression overlay, styling, axes and size limits
#[must_use]
pub fn parse(question: &str) -> VisualizationSpec {
    let lower = question.to_lowercase();
    let mut spec = VisualizationSpec {
        chart_type: chart_type(&lower),
        regression: lower.contains("regression"),
        line_style: line_style(&lower),
        ..VisualizationSpec::default()
    };

    if spec.regression {
        spec.regression_color = COLOR_BEFORE_REGRESSION
            .captures(question)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
            .filter(|w| !STOPWORDS.contains(&w.as_str()) && w != "linear");
    }

    if let Some((x, y)) = axis_fields(question) {
        spec.x_field = Some(x);
        spec.y_field = Some(y);
    }

    if let Some(caps) = DIMENSIONS.captures(question) {
        let w = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let h = caps.get(2).and_then(|m| m.as_str().parse().ok());
        if let (Some(w), Some(h)) = (w, h) {
            spec.width = w;
            spec.height = h;
        }
    }

    if let Some(bytes) = BYTE_BUDGET
        .captures(question)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
    {
        spec.max_bytes = bytes;
    }

    spec.format = if lower.contains("webp") {
        "webp"
    } else if lower.contains("svg") {
        "svg"
    } else {
        "png"
    }
    .to_string();

    spec
}

fn chart_type(lower: &str) -> ChartType {
    if lower.contains("scatter") {
        ChartType::Scatter
    } else if lower.contains("histogram") {
        ChartType::Histogram
    } else if lower.contains("bar") {
        ChartType::Bar
    } else if lower.contains("line chart") || lower.contains("line plot") || lower.contains("line graph") {
        ChartType::Line
    } else {
        ChartType::Scatter
    }
}

fn line_style(lower: &str) -> LineStyle {
    if lower.contains("dotted") {
        LineStyle::Dotted
    } else if lower.contains("dashed") {
        LineStyle::Dashed
    } else {
        LineStyle::Solid
    }
}

fn axis_fields(question: &str) -> Option<(String, String)> {
    AXIS_PAIR.captures_iter(question).find_map(|caps| {
        let x = caps.get(1)?.as_str();
        let y = caps.get(2)?.as_str();
        let usable = |w: &str| !STOPWORDS.contains(&w.to_lowercase().as_str());
        (usable(x) && usable(y)).then(|| (x.to_string(), y.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_scatterplot() {
        let spec = parse(
            "Draw a scatterplot of Rank and Peak along with a dotted red regression line through it. \
             Return as a base-64 encoded data URI under 100,000 bytes.",
        );
        assert_eq!(spec.chart_type, ChartType::Scatter);
        assert!(spec.regression);
        assert_eq!(spec.line_style, LineStyle::Dotted);
        assert_eq!(spec.regression_color.as_deref(), Some("red"));
        assert_eq!(spec.x_field.as_deref(), Some("Rank"));
        assert_eq!(spec.y_field.as_deref(), Some("Peak"));
        assert_eq!(spec.max_bytes, 100_000);
        assert_eq!(spec.format, "png");
    }

    #[test]
    fn defaults_without_directives() {
        let spec = parse("Make a chart");
        assert_eq!(spec, VisualizationSpec::default());
    }

    #[test]
    fn bar_chart_with_size_and_dashes() {
        let spec = parse("Bar chart of year and gross, 800x600, dashed blue regression line");
        assert_eq!(spec.chart_type, ChartType::Bar);
        assert_eq!((spec.width, spec.height), (800, 600));
        assert_eq!(spec.line_style, LineStyle::Dashed);
        assert_eq!(spec.regression_color.as_deref(), Some("blue"));
        assert_eq!(spec.x_field.as_deref(), Some("year"));
    }

    #[test]
    fn colour_is_absent_when_preceded_by_style_word() {
        let spec = parse("scatter plot of a and b with a dotted regression line");
        assert!(spec.regression);
        assert_eq!(spec.regression_color, None);
        assert_eq!(spec.x_field, None);
    }

    #[test]
    fn line_chart_detected() {
        assert_eq!(parse("line chart of date and price").chart_type, ChartType::Line);
    }
}
