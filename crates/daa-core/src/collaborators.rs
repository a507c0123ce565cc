//! Collaborator interfaces consumed by the pipeline
//!
//! Scraping, query execution, text generation and chart rasterisation live
//! outside the core. They are injected into the [`Orchestrator`] at
//! construction time so tests can substitute deterministic doubles.
//!
//! [`Orchestrator`]: crate::orchestrator::Orchestrator

use crate::data::{QueryResult, ScrapedPage, StageResult};
use crate::error::{LanguageModelError, QueryError};
use crate::types::VisualizationSpec;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Fetches a page and extracts its tables. Never fails: an unreachable or
/// unparseable page yields an empty [`ScrapedPage`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Fetch `url`
    async fn fetch(&self, url: &str) -> ScrapedPage;
}

/// Executes tabular queries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Run `query`
    async fn query(&self, query: &str) -> Result<QueryResult, QueryError>;
}

/// Produces free text for a prompt
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt`; authentication failures use the distinguished variant
    async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError>;
}

/// Rasterises a chart into a data URI. Never fails: on internal error a
/// minimal valid placeholder image is returned.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Render `data` as described by `spec`
    async fn render(&self, data: &StageResult, spec: &VisualizationSpec) -> String;
}

/// Bundle of injected collaborators, cheap to clone
#[derive(Clone)]
pub struct Collaborators {
    /// Page fetcher
    pub scraper: Arc<dyn Scraper>,
    /// Query executor
    pub query_engine: Arc<dyn QueryEngine>,
    /// Text generator
    pub language_model: Arc<dyn LanguageModel>,
    /// Chart rasteriser
    pub chart_renderer: Arc<dyn ChartRenderer>,
}

impl Collaborators {
    /// Create new bundle
    #[inline]
    #[must_use]
    pub fn new(
        scraper: Arc<dyn Scraper>,
        query_engine: Arc<dyn QueryEngine>,
        language_model: Arc<dyn LanguageModel>,
        chart_renderer: Arc<dyn ChartRenderer>,
    ) -> Self {
        Self {
            scraper,
            query_engine,
            language_model,
            chart_renderer,
        }
    }

    /// Replace the language model
    #[inline]
    #[must_use]
    pub fn with_language_model(mut self, language_model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = language_model;
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
