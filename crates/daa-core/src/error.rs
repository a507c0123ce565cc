//! Error types for DAA Core
//!
//! Provides the request-level failure taxonomy:
//! - Malformed requests (rejected before the pipeline runs)
//! - Authentication failures from the language model
//! - End-to-end timeouts
//! - Uncategorised internal failures
//!
//! Degradations (assisted extraction, acquisition, transformation and
//! transient answering failures) never surface as [`DAAError`]; they are
//! recovered inside the pipeline.

use serde::{Deserialize, Serialize};

/// Main DAA error type
#[derive(Debug, thiserror::Error)]
pub enum DAAError {
    /// Request body could not be turned into task text
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Language model rejected our credentials
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// End-to-end budget elapsed before assembly completed
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl DAAError {
    /// Stable wire identifier for this failure kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "malformed_request",
            Self::Authentication(_) => "authentication_error",
            Self::Timeout { .. } => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Check if the caller may usefully resubmit the same request
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Internal(_))
    }

    /// Build the JSON failure body returned to callers
    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        let details = match self {
            Self::MalformedRequest(msg) | Self::Authentication(msg) | Self::Internal(msg) => {
                truncate_details(msg)
            }
            Self::Timeout { timeout_ms } => {
                format!("analysis did not complete within {timeout_ms}ms")
            }
        };
        ErrorResponse {
            error: self.kind().to_string(),
            details,
            timeout_ms: match self {
                Self::Timeout { timeout_ms } => Some(*timeout_ms),
                _ => None,
            },
        }
    }
}

impl From<LanguageModelError> for DAAError {
    fn from(err: LanguageModelError) -> Self {
        match err {
            LanguageModelError::Authentication(msg) => Self::Authentication(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Failure body: `{ "error": ..., "details": ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Failure kind
    pub error: String,
    /// Short human-readable explanation
    pub details: String,
    /// Configured budget, present only for timeouts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

const MAX_DETAILS_CHARS: usize = 300;

fn truncate_details(msg: &str) -> String {
    if msg.chars().count() <= MAX_DETAILS_CHARS {
        return msg.to_string();
    }
    let mut out: String = msg.chars().take(MAX_DETAILS_CHARS).collect();
    out.push_str("...");
    out
}

/// Language model collaborator errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum LanguageModelError {
    /// Credentials rejected; never retried
    #[error("authentication rejected: {0}")]
    Authentication(String),

    /// Network or transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider answered with something we could not use
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Provider throttled the request
    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl LanguageModelError {
    /// Authentication errors are escalated, everything else may be retried
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Authentication(_))
    }
}

/// Query engine collaborator errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    /// No backend is wired
    #[error("no query backend configured")]
    Unconfigured,

    /// Backend rejected or failed the query
    #[error("query failed: {0}")]
    Execution(String),

    /// Backend unreachable
    #[error("query transport error: {0}")]
    Transport(String),
}
