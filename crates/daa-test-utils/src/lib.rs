//! Testing utilities for DAA workspace
//!
//! Collaborator doubles, fixtures, and orchestrator setup helpers.

#![allow(missing_docs)]

use async_trait::async_trait;
use daa_core::{
    ChartRenderer, Collaborators, DAAConfig, LanguageModel, LanguageModelError, Orchestrator,
    QueryEngine, QueryError, QueryResult, Record, RetryPolicy, ScrapedPage, Scraper, StageResult,
    Table, VisualizationSpec,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Task text from the highest-grossing films evaluation
pub const EVALUATION_TASK: &str = "Scrape the list of highest grossing films from Wikipedia. It is at the URL:
https://en.wikipedia.org/wiki/List_of_highest-grossing_films

Answer the following questions and respond with a JSON array of strings containing the answer.

1. How many $2 bn movies were released before 2020?
2. Which is the earliest film that grossed over $1.5 bn?
3. What's the correlation between the Rank and Peak?
4. Draw a scatterplot of Rank and Peak along with a dotted red regression line through it.
   Return as a base-64 encoded data URI, `\"data:image/png;base64,iVBORw0KG...\"` under 100,000 bytes.
";

/// Data URI returned by [`StubChartRenderer`] unless overridden
pub const STUB_CHART: &str = "data:image/png;base64,c3R1Yg==";

// ---------------------------------------------------------------------------
// Scrapers
// ---------------------------------------------------------------------------

/// Returns the same page for every URL
#[derive(Debug, Clone, Default)]
pub struct StaticScraper {
    page: ScrapedPage,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl StaticScraper {
    pub fn new(page: ScrapedPage) -> Self {
        Self {
            page,
            fetched: Arc::default(),
        }
    }

    /// Scraper that always comes back empty
    pub fn empty() -> Self {
        Self::default()
    }

    /// URLs fetched so far
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scraper for StaticScraper {
    async fn fetch(&self, url: &str) -> ScrapedPage {
        self.fetched.lock().unwrap().push(url.to_string());
        self.page.clone()
    }
}

// ---------------------------------------------------------------------------
// Query engines
// ---------------------------------------------------------------------------

/// Returns a fixed result (or error) for every query
#[derive(Debug, Clone)]
pub struct StaticQueryEngine {
    result: Result<QueryResult, QueryError>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl StaticQueryEngine {
    pub fn new(result: QueryResult) -> Self {
        Self {
            result: Ok(result),
            queries: Arc::default(),
        }
    }

    pub fn failing(error: QueryError) -> Self {
        Self {
            result: Err(error),
            queries: Arc::default(),
        }
    }

    /// Queries received so far
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl Default for StaticQueryEngine {
    fn default() -> Self {
        Self::failing(QueryError::Unconfigured)
    }
}

#[async_trait]
impl QueryEngine for StaticQueryEngine {
    async fn query(&self, query: &str) -> Result<QueryResult, QueryError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.result.clone()
    }
}

// ---------------------------------------------------------------------------
// Language models
// ---------------------------------------------------------------------------

/// Answers by substring rules over the prompt and records every prompt
#[derive(Debug, Clone)]
pub struct ScriptedLanguageModel {
    rules: Vec<(String, String)>,
    fallback: String,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLanguageModel {
    /// Model that replies `fallback` unless a rule matches
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            fallback: fallback.into(),
            prompts: Arc::default(),
        }
    }

    /// Reply `reply` to prompts containing `needle`; earlier rules win
    #[must_use]
    pub fn with_rule(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), reply.into()));
        self
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map_or(&self.fallback, |(_, reply)| reply);
        Ok(reply.clone())
    }
}

/// Fails every call with the same error
#[derive(Debug, Clone)]
pub struct FailingLanguageModel {
    error: LanguageModelError,
    calls: Arc<AtomicUsize>,
}

impl FailingLanguageModel {
    pub fn new(error: LanguageModelError) -> Self {
        Self {
            error,
            calls: Arc::default(),
        }
    }

    pub fn authentication() -> Self {
        Self::new(LanguageModelError::Authentication("invalid api key".into()))
    }

    pub fn transport() -> Self {
        Self::new(LanguageModelError::Transport("connection refused".into()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for FailingLanguageModel {
    async fn complete(&self, _prompt: &str) -> Result<String, LanguageModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Never resolves
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverLanguageModel;

#[async_trait]
impl LanguageModel for NeverLanguageModel {
    async fn complete(&self, _prompt: &str) -> Result<String, LanguageModelError> {
        futures::future::pending().await
    }
}

/// Answers after a fixed delay
#[derive(Debug, Clone)]
pub struct SlowLanguageModel {
    delay: Duration,
    reply: String,
}

impl SlowLanguageModel {
    pub fn new(delay: Duration, reply: impl Into<String>) -> Self {
        Self {
            delay,
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for SlowLanguageModel {
    async fn complete(&self, _prompt: &str) -> Result<String, LanguageModelError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

// ---------------------------------------------------------------------------
// Chart renderers
// ---------------------------------------------------------------------------

/// Returns a fixed data URI and records the specs it was asked to draw
#[derive(Debug, Clone)]
pub struct StubChartRenderer {
    uri: String,
    specs: Arc<Mutex<Vec<VisualizationSpec>>>,
}

impl StubChartRenderer {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            specs: Arc::default(),
        }
    }

    /// Specs rendered so far
    pub fn specs(&self) -> Vec<VisualizationSpec> {
        self.specs.lock().unwrap().clone()
    }
}

impl Default for StubChartRenderer {
    fn default() -> Self {
        Self::new(STUB_CHART)
    }
}

#[async_trait]
impl ChartRenderer for StubChartRenderer {
    async fn render(&self, _data: &StageResult, spec: &VisualizationSpec) -> String {
        self.specs.lock().unwrap().push(spec.clone());
        self.uri.clone()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Top of the highest-grossing films table, cells as scraped
pub fn films_table() -> Table {
    let headers = ["Rank", "Peak", "Title", "Worldwide gross", "Year", "Ref"]
        .iter()
        .map(ToString::to_string)
        .collect();
    let rows = vec![
        ("1", "1", "Avatar", "$2,923,706,026", "2009", "[# 1]"),
        ("2", "1", "Avengers: Endgame", "$2,797,501,328", "2019", "[# 2]"),
        ("3", "1", "Avatar: The Way of Water", "$2,320,250,281", "2022", "[# 3]"),
        ("4", "1", "Titanic", "$2,257,844,554", "1997", "[# 4]"),
        ("5", "3", "Star Wars: The Force Awakens", "$2,068,223,624", "2015", "[# 5]"),
        ("6", "4", "Avengers: Infinity War", "$2,048,359,754", "2018", "[# 6]"),
        ("7", "6", "Spider-Man: No Way Home", "$1,922,598,800", "2021", "[# 7]"),
        ("8", "3", "Jurassic World", "$1,671,537,444", "2015", "[# 8]"),
        ("9", "2", "The Lion King", "$1,656,943,394", "2019", "[# 9]"),
        ("10", "3", "The Avengers", "$1,518,815,515", "2012", "[# 10]"),
    ]
    .into_iter()
    .map(|(rank, peak, title, gross, year, reference)| {
        [rank, peak, title, gross, year, reference]
            .iter()
            .map(|cell| Value::String((*cell).to_string()))
            .collect()
    })
    .collect();
    Table::new(headers, rows)
}

/// Scraped page wrapping [`films_table`] plus a small navigation table
pub fn films_page() -> ScrapedPage {
    ScrapedPage {
        text: "List of highest-grossing films. Films ranked by worldwide box office gross.".into(),
        tables: vec![
            Table::new(vec!["Contents".into()], vec![vec![json!("Top")]]),
            films_table(),
        ],
    }
}

/// Records with rank 1..=5 and peak 1,1,1,2,3
pub fn rank_peak_records() -> Vec<Record> {
    [(1, 1), (2, 1), (3, 1), (4, 2), (5, 3)]
        .into_iter()
        .map(|(rank, peak)| {
            let mut record = Record::new();
            record.insert("rank".into(), json!(rank));
            record.insert("peak".into(), json!(peak));
            record
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// Config with heuristic extraction and millisecond retries
pub fn test_config() -> DAAConfig {
    DAAConfig::new()
        .with_assisted_extraction(false)
        .with_retry(RetryPolicy {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 4,
        })
}

/// Collaborators with no data and the given model
pub fn collaborators_with_model(model: Arc<dyn LanguageModel>) -> Collaborators {
    Collaborators::new(
        Arc::new(StaticScraper::empty()),
        Arc::new(StaticQueryEngine::default()),
        model,
        Arc::new(StubChartRenderer::default()),
    )
}

pub fn setup_test_orchestrator(model: Arc<dyn LanguageModel>) -> Orchestrator {
    Orchestrator::new(test_config(), collaborators_with_model(model))
}
