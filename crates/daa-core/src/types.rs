//! Core types for DAA
//!
//! Defines the fundamental types for the pipeline:
//! - DAA configuration and retry policy
//! - The task plan and its questions
//! - Processing step directives
//! - Visualization specifications

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ulid::Ulid;

/// Unique request identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Ulid);

impl RequestId {
    /// Generate new request ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// DAA configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DAAConfig {
    /// End-to-end budget used when a request does not carry one
    pub default_timeout_ms: u64,
    /// Whether to ask the language model for a plan before the heuristics
    pub assisted_extraction: bool,
    /// When charts are rendered relative to the other answers
    pub chart_mode: ChartMode,
    /// Retry policy for language model calls
    pub retry: RetryPolicy,
    /// Rows of tabular data included in answering prompts
    pub context_rows: usize,
    /// Characters of raw page text included in answering prompts
    pub context_chars: usize,
}

impl DAAConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With default timeout
    #[inline]
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// With assisted extraction toggle
    #[inline]
    #[must_use]
    pub fn with_assisted_extraction(mut self, enabled: bool) -> Self {
        self.assisted_extraction = enabled;
        self
    }

    /// With chart mode
    #[inline]
    #[must_use]
    pub fn with_chart_mode(mut self, mode: ChartMode) -> Self {
        self.chart_mode = mode;
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for DAAConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 180_000,
            assisted_extraction: true,
            chart_mode: ChartMode::Inline,
            retry: RetryPolicy::default(),
            context_rows: 25,
            context_chars: 6_000,
        }
    }
}

/// Chart rendering placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartMode {
    /// Render while answering, in question order
    #[default]
    Inline,
    /// Answer everything with placeholders first, render charts afterwards
    Deferred,
}

/// Exponential backoff for transient collaborator failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Policy that never retries
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let factor = 1u64.checked_shl(attempt.min(20)).unwrap_or(u64::MAX);
        let ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        std::time::Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

/// Shape of the task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// Data comes from a web page
    WebScrape,
    /// Data comes from a query
    StructuredQuery,
    /// Both kinds of source are involved
    Mixed,
    /// No data source recognised
    Unclassified,
}

/// Where acquisition gets its data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DataSource {
    /// Absolute web URL
    Web(String),
    /// Query-language text
    Query(String),
    /// Local data file path
    File(String),
}

/// Transformation directive kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepOperation {
    /// Keep matching records
    Filter,
    /// Map one field
    Transform,
    /// Reduce records
    Aggregate,
    /// Order records
    Sort,
    /// Combine datasets (pass-through)
    Join,
    /// Derive a field from two numeric fields
    Calculate,
    /// Anything else; passes data through
    Other(String),
}

impl From<String> for StepOperation {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<StepOperation> for String {
    fn from(op: StepOperation) -> Self {
        match op {
            StepOperation::Filter => "filter".to_string(),
            StepOperation::Transform => "transform".to_string(),
            StepOperation::Aggregate => "aggregate".to_string(),
            StepOperation::Sort => "sort".to_string(),
            StepOperation::Join => "join".to_string(),
            StepOperation::Calculate => "calculate".to_string(),
            StepOperation::Other(name) => name,
        }
    }
}

impl StepOperation {
    /// Parse an operation name leniently
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "filter" => Self::Filter,
            "transform" => Self::Transform,
            "aggregate" => Self::Aggregate,
            "sort" => Self::Sort,
            "join" => Self::Join,
            "calculate" => Self::Calculate,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One transformation directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStep {
    /// Directive kind
    pub operation: StepOperation,
    /// Free-form parameters
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ProcessingStep {
    /// Create new step
    #[inline]
    #[must_use]
    pub fn new(operation: StepOperation) -> Self {
        Self {
            operation,
            params: Map::new(),
        }
    }

    /// With parameter
    #[inline]
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// String parameter lookup (first present key wins)
    #[must_use]
    pub fn str_param(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| match self.params.get(*k) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        })
    }
}

/// Category of expected answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Count,
    Calculation,
    Correlation,
    Visualization,
    Comparison,
    Text,
    Date,
}

impl AnswerKind {
    /// Answers that should be reduced to a number
    #[inline]
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Count | Self::Calculation | Self::Correlation)
    }
}

/// JSON type the answer is expected to have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpectedFormat {
    Number,
    String,
    Boolean,
    Array,
    Object,
    Base64Image,
}

/// Chart family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[default]
    Scatter,
    Line,
    Bar,
    Histogram,
}

/// Stroke pattern for the regression line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    #[default]
    Solid,
    Dotted,
    Dashed,
}

/// How to draw a chart answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationSpec {
    /// Chart family
    pub chart_type: ChartType,
    /// Field plotted on the x axis
    pub x_field: Option<String>,
    /// Field plotted on the y axis
    pub y_field: Option<String>,
    /// Whether to overlay a least-squares line
    pub regression: bool,
    /// Regression line stroke
    pub line_style: LineStyle,
    /// Regression line colour name
    pub regression_color: Option<String>,
    /// Pixel width
    pub width: u32,
    /// Pixel height
    pub height: u32,
    /// Requested encoding (png, webp, svg)
    pub format: String,
    /// Maximum encoded size in bytes
    pub max_bytes: usize,
}

impl Default for VisualizationSpec {
    fn default() -> Self {
        Self {
            chart_type: ChartType::Scatter,
            x_field: None,
            y_field: None,
            regression: false,
            line_style: LineStyle::Solid,
            regression_color: None,
            width: 640,
            height: 480,
            format: "png".to_string(),
            max_bytes: 100_000,
        }
    }
}

/// One unit of expected output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Literal question text; object key for keyed-object output
    pub text: String,
    /// Answer category
    pub answer_kind: AnswerKind,
    /// Expected JSON type
    pub expected_format: ExpectedFormat,
    /// Present iff `answer_kind` is visualization
    pub visualization_spec: Option<VisualizationSpec>,
}

impl Question {
    /// Create a plain question
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<String>, answer_kind: AnswerKind, expected_format: ExpectedFormat) -> Self {
        Self {
            text: text.into(),
            answer_kind,
            expected_format,
            visualization_spec: None,
        }
    }

    /// Create a chart question
    #[inline]
    #[must_use]
    pub fn visualization(text: impl Into<String>, spec: VisualizationSpec) -> Self {
        Self {
            text: text.into(),
            answer_kind: AnswerKind::Visualization,
            expected_format: ExpectedFormat::Base64Image,
            visualization_spec: Some(spec),
        }
    }

    /// Whether this question is answered with a chart
    #[inline]
    #[must_use]
    pub fn is_visualization(&self) -> bool {
        self.answer_kind == AnswerKind::Visualization
    }
}

/// Packaging of the final answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputShape {
    #[default]
    OrderedArray,
    KeyedObject,
    FreeText,
}

/// Parsed intent of a task description; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    /// Task shape
    pub kind: TaskKind,
    /// Data source, absent for unclassified tasks
    pub data_source: Option<DataSource>,
    /// Ordered transformation directives
    pub processing_steps: Vec<ProcessingStep>,
    /// Ordered questions; never empty
    pub questions: Vec<Question>,
    /// Packaging of the answers
    pub output_shape: OutputShape,
    /// Original description
    pub raw_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 350,
        };
        assert_eq!(policy.delay_for(0).as_millis(), 100);
        assert_eq!(policy.delay_for(1).as_millis(), 200);
        assert_eq!(policy.delay_for(2).as_millis(), 350);
        assert_eq!(policy.delay_for(40).as_millis(), 350);
    }

    #[test]
    fn step_operation_parse_is_lenient() {
        assert_eq!(StepOperation::parse(" Sort "), StepOperation::Sort);
        assert_eq!(
            StepOperation::parse("pivot"),
            StepOperation::Other("pivot".to_string())
        );
    }

    #[test]
    fn step_str_param_falls_through_keys() {
        let step = ProcessingStep::new(StepOperation::Filter)
            .with_param("column", "year")
            .with_param("value", 2020);
        assert_eq!(step.str_param(&["field", "column"]).as_deref(), Some("year"));
        assert_eq!(step.str_param(&["value"]).as_deref(), Some("2020"));
        assert_eq!(step.str_param(&["missing"]), None);
    }

    #[test]
    fn visualization_question_invariant() {
        let q = Question::visualization("plot it", VisualizationSpec::default());
        assert!(q.is_visualization());
        assert_eq!(q.expected_format, ExpectedFormat::Base64Image);
        assert!(q.visualization_spec.is_some());
    }

    #[test]
    fn config_defaults() {
        let config = DAAConfig::new();
        assert_eq!(config.default_timeout_ms, 180_000);
        assert_eq!(config.chart_mode, ChartMode::Inline);
        assert_eq!(config.retry.max_retries, 3);
    }
}
