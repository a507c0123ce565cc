//! Data Analyst Agent orchestrator
//!
//! Drives one request through the pipeline:
//! - Validates the task text
//! - Extracts a task plan
//! - Runs the stages
//! - Assembles the answers
//!
//! The pipeline races a timeout watchdog. Whichever finishes first decides
//! the outcome; a pipeline that loses the race is aborted and its result is
//! never observed.

use crate::assembler;
use crate::collaborators::Collaborators;
use crate::error::DAAError;
use crate::extractor::PlanExtractor;
use crate::stages::StageRunner;
use crate::types::{DAAConfig, RequestId};
use serde_json::Value;
use std::time::Duration;
use tracing::Instrument;

/// Entry point for analysis requests
///
/// Holds no per-request state; one instance serves any number of concurrent
/// requests.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    /// Configuration
    config: DAAConfig,
    /// Injected collaborators
    collaborators: Collaborators,
}

impl Orchestrator {
    /// Create new orchestrator
    #[inline]
    #[must_use]
    pub fn new(config: DAAConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DAAConfig {
        &self.config
    }

    /// Answer `task_text` within `timeout_ms`.
    ///
    /// # Workflow
    /// 1. Reject empty task text
    /// 2. Extract a plan (assisted when enabled, heuristic otherwise)
    /// 3. Run acquisition, transformation and answering
    /// 4. Assemble and return the bare JSON value
    ///
    /// # Errors
    /// `MalformedRequest` for empty input, `Authentication` when the language
    /// model rejects credentials, `Timeout` when the budget elapses, and
    /// `Internal` if the pipeline task dies.
    pub async fn handle(&self, task_text: &str, timeout_ms: u64) -> Result<Value, DAAError> {
        let request_id = RequestId::new();
        let span = tracing::info_span!("request", request_id = %request_id);
        self.handle_inner(task_text, timeout_ms).instrument(span).await
    }

    /// Same as [`handle`](Self::handle) with the configured default budget
    pub async fn handle_with_default_timeout(&self, task_text: &str) -> Result<Value, DAAError> {
        self.handle(task_text, self.config.default_timeout_ms).await
    }

    async fn handle_inner(&self, task_text: &str, timeout_ms: u64) -> Result<Value, DAAError> {
        tracing::debug!("State: received");
        if task_text.trim().is_empty() {
            tracing::debug!("State: failed (empty task)");
            return Err(DAAError::MalformedRequest("task description is empty".to_string()));
        }
        tracing::info!("Handling task ({} chars, budget {}ms)", task_text.len(), timeout_ms);

        let pipeline = run_pipeline(
            self.config.clone(),
            self.collaborators.clone(),
            task_text.to_string(),
        )
        .in_current_span();
        let mut handle = tokio::spawn(pipeline);

        tokio::select! {
            joined = &mut handle => match joined {
                Ok(Ok(value)) => {
                    tracing::debug!("State: done");
                    Ok(value)
                }
                Ok(Err(e)) => {
                    tracing::debug!("State: failed ({})", e.kind());
                    Err(e)
                }
                Err(e) => {
                    tracing::error!("Pipeline task failed: {}", e);
                    Err(DAAError::Internal(format!("pipeline task failed: {e}")))
                }
            },
            () = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                handle.abort();
                tracing::warn!("State: timed-out after {}ms", timeout_ms);
                Err(DAAError::Timeout { timeout_ms })
            }
        }
    }
}

async fn run_pipeline(
    config: DAAConfig,
    collaborators: Collaborators,
    task_text: String,
) -> Result<Value, DAAError> {
    tracing::debug!("State: extracting");
    let extractor = if config.assisted_extraction {
        PlanExtractor::assisted(collaborators.language_model.clone())
    } else {
        PlanExtractor::heuristic()
    };
    let plan = extractor.extract(&task_text).await;
    tracing::debug!(
        "Plan: {:?} with {} questions, shape {:?}",
        plan.kind,
        plan.questions.len(),
        plan.output_shape
    );

    tracing::debug!("State: running-stages");
    let output = StageRunner::new(collaborators, config).run(&plan).await?;

    tracing::debug!("State: assembling");
    let value = assembler::assemble(&plan, output.answers);
    Ok(assembler::substitute_charts(value, output.charts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockChartRenderer, MockLanguageModel, MockQueryEngine, MockScraper};
    use crate::error::LanguageModelError;
    use crate::types::{ChartMode, RetryPolicy};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn orchestrator(model: MockLanguageModel, renderer: MockChartRenderer, config: DAAConfig) -> Orchestrator {
        Orchestrator::new(
            config,
            Collaborators::new(
                Arc::new(MockScraper::new()),
                Arc::new(MockQueryEngine::new()),
                Arc::new(model),
                Arc::new(renderer),
            ),
        )
    }

    fn heuristic_config() -> DAAConfig {
        DAAConfig::default()
            .with_assisted_extraction(false)
            .with_retry(RetryPolicy::none())
    }

    #[tokio::test]
    async fn empty_task_is_malformed() {
        let o = orchestrator(MockLanguageModel::new(), MockChartRenderer::new(), heuristic_config());
        let err = o.handle("  \n ", 1_000).await.unwrap_err();
        assert_eq!(err.kind(), "malformed_request");
    }

    #[tokio::test]
    async fn keyed_object_output() {
        let mut model = MockLanguageModel::new();
        model.expect_complete().returning(|_| Ok("blue".into()));
        let o = orchestrator(model, MockChartRenderer::new(), heuristic_config());
        let out = o
            .handle("Respond with a JSON object.\n1. What colour is the sky?", 1_000)
            .await
            .unwrap();
        assert_eq!(out, json!({"What colour is the sky?": "blue"}));
    }

    #[tokio::test]
    async fn authentication_failure_aborts() {
        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .returning(|_| Err(LanguageModelError::Authentication("invalid api key".into())));
        let o = orchestrator(model, MockChartRenderer::new(), heuristic_config());
        let err = o.handle("Who won?", 1_000).await.unwrap_err();
        assert_eq!(err.kind(), "authentication_error");
    }

    #[tokio::test]
    async fn deferred_charts_are_substituted() {
        let mut model = MockLanguageModel::new();
        model.expect_complete().returning(|_| Ok("4".into()));
        let mut renderer = MockChartRenderer::new();
        renderer
            .expect_render()
            .returning(|_, _| "data:image/png;base64,Zm9v".into());
        let config = heuristic_config().with_chart_mode(ChartMode::Deferred);
        let o = orchestrator(model, renderer, config);
        let out = o
            .handle("1. How many legs does a dog have?\n2. Draw a bar chart of legs and animals", 1_000)
            .await
            .unwrap();
        assert_eq!(out, json!([4, "data:image/png;base64,Zm9v"]));
    }
}
