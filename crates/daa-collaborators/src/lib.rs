//! DAA Collaborators - production implementations of the core traits
//!
//! - [`HttpScraper`]: fetches pages and extracts tables
//! - [`OpenAiLanguageModel`] / [`LocalLanguageModel`]: language models
//! - [`RemoteQueryEngine`] / [`UnconfiguredQueryEngine`]: query execution
//! - [`PngChartRenderer`]: PNG charts as data URIs

#![warn(unreachable_pub)]

pub mod chart;
pub mod llm;
pub mod query;
pub mod scraper;

pub use chart::{PngChartRenderer, PLACEHOLDER_DATA_URI};
pub use llm::{LocalLanguageModel, OpenAiConfig, OpenAiLanguageModel};
pub use query::{RemoteQueryEngine, UnconfiguredQueryEngine};
pub use scraper::{HttpScraper, ScrapeError, ScraperConfig};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
