//! Staged analysis pipeline
//!
//! Runs strictly in order, each stage feeding the next:
//! - **Acquisition**: scraper or query engine, degrading to no data
//! - **Transformation**: processing steps over records
//! - **Answering**: one value per question, in declared order
//!
//! Charts are rendered inline by default. In deferred mode chart slots hold
//! [`VISUALIZATION_PLACEHOLDER`] until every other question is answered, and
//! the rendered payloads are returned separately for the assembler to
//! substitute.

pub mod acquisition;
pub mod answer;
pub mod transform;

use crate::collaborators::Collaborators;
use crate::error::DAAError;
use crate::types::{ChartMode, DAAConfig, TaskPlan};
use serde_json::Value;

/// Sentinel occupying a chart slot until the chart is rendered
pub const VISUALIZATION_PLACEHOLDER: &str = "__daa_visualization_pending__";

/// Answers produced by a stage run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    /// One value per question, in declared order
    pub answers: Vec<Value>,
    /// Deferred chart payloads, in question order
    pub charts: Vec<String>,
}

/// Runs acquisition, transformation and answering for one plan
#[derive(Debug, Clone)]
pub struct StageRunner {
    collaborators: Collaborators,
    config: DAAConfig,
}

impl StageRunner {
    /// Create new stage runner
    #[inline]
    #[must_use]
    pub fn new(collaborators: Collaborators, config: DAAConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    /// Run every stage for `plan`.
    ///
    /// Only an authentication failure from the language model is returned as
    /// an error; everything else degrades inside the slot or the stage.
    pub async fn run(&self, plan: &TaskPlan) -> Result<StageOutput, DAAError> {
        tracing::debug!("Stage: acquisition");
        let data = acquisition::acquire(plan.data_source.as_ref(), &self.collaborators).await;

        tracing::debug!(
            "Stage: transformation ({} steps over {} data)",
            plan.processing_steps.len(),
            data.shape()
        );
        let data = transform::apply_all(&plan.processing_steps, data);

        tracing::debug!("Stage: answering {} questions", plan.questions.len());
        let deferred = self.config.chart_mode == ChartMode::Deferred;
        let mut output = StageOutput::default();

        for question in &plan.questions {
            let value = if question.is_visualization() {
                if deferred {
                    Value::String(VISUALIZATION_PLACEHOLDER.to_string())
                } else {
                    answer::render_chart(question, &data, self.collaborators.chart_renderer.as_ref()).await
                }
            } else {
                answer::answer(question, &data, &plan.raw_text, &self.collaborators, &self.config).await?
            };
            output.answers.push(value);
        }

        if deferred {
            for question in plan.questions.iter().filter(|q| q.is_visualization()) {
                if let Value::String(uri) =
                    answer::render_chart(question, &data, self.collaborators.chart_renderer.as_ref()).await
                {
                    output.charts.push(uri);
                }
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockChartRenderer, MockLanguageModel, MockQueryEngine, MockScraper};
    use crate::extractor::extract_heuristic;
    use crate::types::RetryPolicy;
    use serde_json::json;
    use std::sync::Arc;

    fn runner(model: MockLanguageModel, renderer: MockChartRenderer, mode: ChartMode) -> StageRunner {
        let collaborators = Collaborators::new(
            Arc::new(MockScraper::new()),
            Arc::new(MockQueryEngine::new()),
            Arc::new(model),
            Arc::new(renderer),
        );
        StageRunner::new(
            collaborators,
            DAAConfig::default()
                .with_chart_mode(mode)
                .with_retry(RetryPolicy::none()),
        )
    }

    const TASK: &str = "1. What is the capital of France?\n2. Plot a chart of x and y.";

    #[tokio::test]
    async fn inline_mode_renders_in_place() {
        let mut model = MockLanguageModel::new();
        model.expect_complete().times(1).returning(|_| Ok("Paris".into()));
        let mut renderer = MockChartRenderer::new();
        renderer
            .expect_render()
            .times(1)
            .returning(|_, _| "data:image/png;base64,QQ==".into());

        let plan = extract_heuristic(TASK);
        let out = runner(model, renderer, ChartMode::Inline).run(&plan).await.unwrap();
        assert_eq!(out.answers, vec![json!("Paris"), json!("data:image/png;base64,QQ==")]);
        assert!(out.charts.is_empty());
    }

    #[tokio::test]
    async fn deferred_mode_leaves_placeholder() {
        let mut model = MockLanguageModel::new();
        model.expect_complete().returning(|_| Ok("Paris".into()));
        let mut renderer = MockChartRenderer::new();
        renderer
            .expect_render()
            .returning(|_, _| "data:image/png;base64,QQ==".into());

        let plan = extract_heuristic(TASK);
        let out = runner(model, renderer, ChartMode::Deferred).run(&plan).await.unwrap();
        assert_eq!(out.answers[1], json!(VISUALIZATION_PLACEHOLDER));
        assert_eq!(out.charts, vec!["data:image/png;base64,QQ==".to_string()]);
    }

    #[tokio::test]
    async fn one_failing_question_does_not_abort_siblings() {
        let mut model = MockLanguageModel::new();
        model.expect_complete().returning(|p| {
            if p.contains("capital") {
                Err(crate::error::LanguageModelError::Transport("timeout".into()))
            } else {
                Ok("42".into())
            }
        });
        let plan = extract_heuristic("1. What is the capital of France?\n2. How many moons?");
        let out = runner(model, MockChartRenderer::new(), ChartMode::Inline)
            .run(&plan)
            .await
            .unwrap();
        assert_eq!(out.answers.len(), 2);
        assert!(out.answers[0].as_str().is_some_and(|s| s.starts_with("error:")));
        assert_eq!(out.answers[1], json!(42));
    }
}
