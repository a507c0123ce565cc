//! Language-model-assisted plan parsing
//!
//! The model's reply is treated as untrusted input: anything that does not
//! deserialise cleanly or contradicts the plan invariants is rejected and the
//! caller falls back to the heuristics.

use crate::types::{
    AnswerKind, DataSource, ExpectedFormat, OutputShape, ProcessingStep, Question, TaskKind,
    TaskPlan, VisualizationSpec,
};
use serde::Deserialize;

/// Why an assisted plan was discarded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssistedPlanError {
    /// No JSON object in the reply
    #[error("no JSON object in model output")]
    NoJson,

    /// JSON did not match the plan schema
    #[error("plan did not deserialize: {0}")]
    Schema(String),

    /// Plan has no questions
    #[error("plan has no questions")]
    NoQuestions,

    /// Unclassified plan that still names a data source
    #[error("unclassified plan declares a data source")]
    InconsistentSource,

    /// Question count disagrees with the enumerated list in the task text
    #[error("plan has {assisted} questions, task enumerates {enumerated}")]
    QuestionCountMismatch { assisted: usize, enumerated: usize },
}

#[derive(Debug, Deserialize)]
struct PlanDto {
    kind: TaskKind,
    #[serde(default)]
    data_source: Option<DataSource>,
    #[serde(default)]
    processing_steps: Vec<ProcessingStep>,
    #[serde(default)]
    questions: Vec<QuestionDto>,
    #[serde(default)]
    output_shape: Option<OutputShape>,
}

#[derive(Debug, Deserialize)]
struct QuestionDto {
    text: String,
    answer_kind: AnswerKind,
    #[serde(default)]
    expected_format: Option<ExpectedFormat>,
    #[serde(default)]
    visualization_spec: Option<VisualizationSpec>,
}

/// Slice from the first `{` to the last `}`
#[must_use]
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse and validate a model reply.
///
/// `enumerated` is the number of numbered sub-questions the heuristics found
/// in the task text; zero disables the count check.
pub fn parse_plan(output: &str, task_text: &str, enumerated: usize) -> Result<TaskPlan, AssistedPlanError> {
    let json = extract_json(output).ok_or(AssistedPlanError::NoJson)?;
    let dto: PlanDto =
        serde_json::from_str(json).map_err(|e| AssistedPlanError::Schema(e.to_string()))?;

    if dto.questions.is_empty() {
        return Err(AssistedPlanError::NoQuestions);
    }
    if dto.kind == TaskKind::Unclassified && dto.data_source.is_some() {
        return Err(AssistedPlanError::InconsistentSource);
    }
    if enumerated > 0 && dto.questions.len() != enumerated {
        return Err(AssistedPlanError::QuestionCountMismatch {
            assisted: dto.questions.len(),
            enumerated,
        });
    }

    let questions = dto
        .questions
        .into_iter()
        .filter(|q| !q.text.trim().is_empty())
        .map(|q| Question {
            text: q.text.trim().to_string(),
            answer_kind: q.answer_kind,
            expected_format: q.expected_format.unwrap_or(ExpectedFormat::String),
            visualization_spec: q.visualization_spec,
        })
        .collect::<Vec<_>>();
    if questions.is_empty() {
        return Err(AssistedPlanError::NoQuestions);
    }

    Ok(TaskPlan {
        kind: dto.kind,
        data_source: dto.data_source,
        processing_steps: dto.processing_steps,
        questions,
        output_shape: dto.output_shape.unwrap_or_default(),
        raw_text: task_text.to_string(),
    })
}
