//! Language model collaborators
//!
//! - [`OpenAiLanguageModel`]: OpenAI-compatible chat completions over HTTP
//! - [`LocalLanguageModel`]: deterministic stand-in used when no API key is
//!   configured

use async_trait::async_trait;
use daa_core::stats::number_value;
use daa_core::{LanguageModel, LanguageModelError};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 200;

const SYSTEM_PROMPT: &str = "You are a careful data analyst. Follow the instructions in the user message exactly and keep answers short.";

/// Settings for [`OpenAiLanguageModel`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Chat completions URL
    pub endpoint: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

/// HTTP client for an OpenAI-compatible API
#[derive(Debug, Clone)]
pub struct OpenAiLanguageModel {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiLanguageModel {
    /// Build the client
    ///
    /// # Errors
    /// `Transport` if the HTTP client cannot be constructed.
    pub fn new(config: OpenAiConfig) -> Result<Self, LanguageModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LanguageModelError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn headers(&self) -> Result<HeaderMap, LanguageModelError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| LanguageModelError::Authentication(format!("unusable api key: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

#[async_trait]
impl LanguageModel for OpenAiLanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| LanguageModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = format!("HTTP {}: {}", status.as_u16(), truncate(&text));
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LanguageModelError::Authentication(detail),
                StatusCode::TOO_MANY_REQUESTS => LanguageModelError::RateLimited(detail),
                _ => LanguageModelError::Transport(detail),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| LanguageModelError::Transport(e.to_string()))?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LanguageModelError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LanguageModelError::InvalidResponse("missing choices".to_string()))
    }
}

static QUESTION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Question:\s*(.+)$").expect("valid regex"));
static NUMBER_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\s*(-?\d+(?:\.\d+)?(?:\s*,\s*-?\d+(?:\.\d+)?)*)\s*\]").expect("valid regex"));

/// Reply when the question is outside what the local model can compute
pub const UNABLE_TO_DETERMINE: &str =
    "Unable to determine an answer without a configured language model.";

/// Deterministic offline model.
///
/// Reads the `Question:` line of a prompt and answers simple reductions over
/// a bracketed list of numbers; everything else gets [`UNABLE_TO_DETERMINE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLanguageModel;

impl LocalLanguageModel {
    /// Create the model
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Answer a single question text
    #[must_use]
    pub fn answer(question: &str) -> String {
        let Some(values) = NUMBER_LIST.captures(question).and_then(|c| c.get(1)).map(|m| {
            m.as_str()
                .split(',')
                .filter_map(|v| v.trim().parse::<f64>().ok())
                .collect::<Vec<_>>()
        }) else {
            return UNABLE_TO_DETERMINE.to_string();
        };
        let lower = question.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        #[allow(clippy::cast_precision_loss)]
        let result = if has(&["how many", "count", "number of"]) {
            Some(values.len() as f64)
        } else if has(&["sum", "total"]) {
            Some(values.iter().sum())
        } else if has(&["average", "mean"]) {
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        } else if has(&["minimum", "min", "smallest", "lowest"]) {
            values.iter().copied().reduce(f64::min)
        } else if has(&["maximum", "max", "largest", "highest"]) {
            values.iter().copied().reduce(f64::max)
        } else {
            None
        };

        result.map_or_else(|| UNABLE_TO_DETERMINE.to_string(), |v| number_value(v).to_string())
    }
}

#[async_trait]
impl LanguageModel for LocalLanguageModel {
    async fn complete(&self, prompt: &str) -> Result<String, LanguageModelError> {
        let question = QUESTION_LINE
            .captures_iter(prompt)
            .last()
            .and_then(|c| c.get(1))
            .map_or("", |m| m.as_str().trim());
        Ok(Self::answer(question))
    }
}
