//! Query engine clients

use async_trait::async_trait;
use daa_core::{QueryEngine, QueryError, QueryResult};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
}

/// Sends queries to a remote service that answers `{columns, rows}`
#[derive(Debug, Clone)]
pub struct RemoteQueryEngine {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteQueryEngine {
    /// Build a client for `endpoint`
    ///
    /// # Errors
    /// `Transport` if the HTTP client cannot be constructed.
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl QueryEngine for RemoteQueryEngine {
    async fn query(&self, query: &str) -> Result<QueryResult, QueryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&QueryRequest { query })
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(QueryError::Execution(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<QueryResult>()
            .await
            .map_err(|e| QueryError::Execution(format!("unexpected response: {e}")))
    }
}

/// Stand-in when no query backend is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredQueryEngine;

#[async_trait]
impl QueryEngine for UnconfiguredQueryEngine {
    async fn query(&self, _query: &str) -> Result<QueryResult, QueryError> {
        Err(QueryError::Unconfigured)
    }
}
