//! DAA Server - HTTP surface and wiring for the data analyst agent
//!
//! Builds the production [`Collaborators`] from a [`ServerConfig`] and
//! exposes the orchestrator over warp.

#![warn(unreachable_pub)]

pub mod api;
pub mod config;

pub use api::{parse_task, routes, status_for, TaskRequest};
pub use config::{ConfigError, ServerConfig};

use daa_collaborators::{
    HttpScraper, LocalLanguageModel, OpenAiLanguageModel, PngChartRenderer, RemoteQueryEngine,
    UnconfiguredQueryEngine,
};
use daa_core::{ChartRenderer, Collaborators, LanguageModel, Orchestrator, QueryEngine};
use std::sync::Arc;

/// Construct the collaborators described by `config`
///
/// Without an API key the local language model is used and assisted
/// extraction is switched off in the returned core configuration.
///
/// # Errors
/// Returns an error if an HTTP client cannot be built.
pub fn build_orchestrator(config: &ServerConfig) -> Result<Orchestrator, ConfigError> {
    let mut core = config.core.clone();

    let language_model: Arc<dyn LanguageModel> = if config.has_language_model() {
        tracing::info!("Language model: {} at {}", config.llm.model, config.llm.endpoint);
        Arc::new(
            OpenAiLanguageModel::new(config.llm.clone())
                .map_err(|e| ConfigError::Collaborator(e.to_string()))?,
        )
    } else {
        tracing::warn!("No API key configured; using the local language model without assisted extraction");
        core.assisted_extraction = false;
        Arc::new(LocalLanguageModel::new())
    };

    let query_engine: Arc<dyn QueryEngine> = match &config.query.endpoint {
        Some(endpoint) => Arc::new(
            RemoteQueryEngine::new(endpoint.clone(), config.query.timeout_secs)
                .map_err(|e| ConfigError::Collaborator(e.to_string()))?,
        ),
        None => Arc::new(UnconfiguredQueryEngine),
    };

    let scraper = HttpScraper::new(config.scraper.clone())
        .map_err(|e| ConfigError::Collaborator(e.to_string()))?;

    let chart_renderer: Arc<dyn ChartRenderer> = Arc::new(
        PngChartRenderer::new()
            .with_min_size(config.chart.min_width, config.chart.min_height)
            .with_max_bytes(config.chart.max_bytes),
    );

    Ok(Orchestrator::new(
        core,
        Collaborators::new(Arc::new(scraper), query_engine, language_model, chart_renderer),
    ))
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_api_key_disables_assisted_extraction() {
        let orchestrator = build_orchestrator(&ServerConfig::default()).unwrap();
        assert!(!orchestrator.config().assisted_extraction);
    }

    #[test]
    fn api_key_keeps_assisted_extraction() {
        let mut config = ServerConfig::default();
        config.llm.api_key = Some("sk-test".to_string());
        let orchestrator = build_orchestrator(&config).unwrap();
        assert!(orchestrator.config().assisted_extraction);
    }

    #[tokio::test]
    async fn local_model_answers_list_questions() {
        let orchestrator = build_orchestrator(&ServerConfig::default()).unwrap();
        let out = orchestrator.handle("How many items in [1,2,3,4,5]?", 5_000).await.unwrap();
        assert_eq!(out, serde_json::json!([5]));
    }
}
