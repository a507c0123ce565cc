//! DAA Core - Data Analyst Agent
//!
//! Turns a free-text analysis task into a JSON answer:
//! - Extracts a structured task plan (assisted or heuristic)
//! - Acquires data from a web page, query or file
//! - Applies processing steps to the acquired records
//! - Answers each question by computation, language model or chart
//! - Assembles the answers into the requested output shape
//!
//! External systems are reached only through the traits in
//! [`collaborators`], injected at construction time.
//!
//! # Example
//!
//! ```rust,ignore
//! use daa_core::{Collaborators, DAAConfig, Orchestrator};
//!
//! # async fn example(collaborators: Collaborators) -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::new(DAAConfig::new(), collaborators);
//! let answer = orchestrator
//!     .handle("How many items in [1,2,3,4,5]?", 180_000)
//!     .await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod assembler;
pub mod collaborators;
pub mod data;
pub mod error;
pub mod extractor;
pub mod orchestrator;
pub mod prompts;
pub mod stages;
pub mod stats;
pub mod types;

// Re-exports for convenience
pub use collaborators::{ChartRenderer, Collaborators, LanguageModel, QueryEngine, Scraper};
pub use data::{QueryResult, Record, ScrapedPage, StageResult, Table};
pub use error::{DAAError, ErrorResponse, LanguageModelError, QueryError};
pub use extractor::PlanExtractor;
pub use orchestrator::Orchestrator;
pub use stages::{StageOutput, StageRunner, VISUALIZATION_PLACEHOLDER};
pub use types::{
    AnswerKind, ChartMode, ChartType, DAAConfig, DataSource, ExpectedFormat, LineStyle,
    OutputShape, ProcessingStep, Question, RequestId, RetryPolicy, StepOperation, TaskKind,
    TaskPlan, VisualizationSpec,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with DAA Core
    pub use crate::{
        ChartRenderer, Collaborators, DAAConfig, DAAError, LanguageModel, Orchestrator,
        QueryEngine, Scraper, StageResult, TaskPlan, VisualizationSpec,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
