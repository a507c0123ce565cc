//! HTTP API
//!
//! - `POST /api` and `POST /api/`: answer a task
//! - `GET /health`: service metadata
//!
//! Task bodies may be raw text, a JSON string, a JSON object with a `task`,
//! `question`, `questions` or `text` field, or a multipart form whose first
//! part holds the task. `?timeout_ms=` overrides any budget in the body.

use daa_core::{DAAError, Orchestrator};
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::multipart::FormData;
use warp::path::Tail;
use warp::reply::Response;
use warp::{Buf, Filter, Rejection, Reply};

/// Largest accepted request body
pub const MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;

const TASK_FIELDS: [&str; 4] = ["task", "question", "questions", "text"];

/// Query string of `POST /api`
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ApiQuery {
    /// Budget for this request
    pub timeout_ms: Option<u64>,
}

/// A decoded task body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    /// Free-text task description
    pub text: String,
    /// Budget carried in a JSON body
    pub timeout_ms: Option<u64>,
}

/// Decode a request body into a task
///
/// # Errors
/// `MalformedRequest` when the body is not UTF-8, is empty, or is JSON
/// without a usable task field.
pub fn parse_task(content_type: Option<&str>, body: &[u8]) -> Result<TaskRequest, DAAError> {
    let text = std::str::from_utf8(body)
        .map_err(|_| DAAError::MalformedRequest("body is not valid UTF-8".to_string()))?
        .trim();
    if text.is_empty() {
        return Err(DAAError::MalformedRequest("task description is empty".to_string()));
    }

    let declared_json = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
    let looks_json = text.starts_with('{') || text.starts_with('"');
    if !declared_json && !looks_json {
        return Ok(TaskRequest {
            text: text.to_string(),
            timeout_ms: None,
        });
    }

    match serde_json::from_str::<Value>(text) {
        Ok(value) => task_from_json(&value),
        Err(e) if declared_json => Err(DAAError::MalformedRequest(format!("invalid JSON body: {e}"))),
        Err(_) => Ok(TaskRequest {
            text: text.to_string(),
            timeout_ms: None,
        }),
    }
}

fn task_from_json(value: &Value) -> Result<TaskRequest, DAAError> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => TASK_FIELDS
            .iter()
            .find_map(|field| map.get(*field))
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| format!("{}. {}", i + 1, daa_core::data::value_to_text(item)))
                    .collect::<Vec<_>>()
                    .join("\n"),
                other => other.to_string(),
            })
            .unwrap_or_default(),
        _ => String::new(),
    };
    if text.is_empty() {
        return Err(DAAError::MalformedRequest(format!(
            "JSON body needs one of the fields {}",
            TASK_FIELDS.join(", ")
        )));
    }
    let timeout_ms = value.get("timeout_ms").and_then(Value::as_u64);
    Ok(TaskRequest { text, timeout_ms })
}

/// HTTP status for a pipeline failure
#[must_use]
pub fn status_for(error: &DAAError) -> StatusCode {
    match error {
        DAAError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        DAAError::Authentication(_) => StatusCode::BAD_GATEWAY,
        DAAError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DAAError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(error: &DAAError) -> Response {
    warp::reply::with_status(warp::reply::json(&error.to_response()), status_for(error)).into_response()
}

/// All routes
pub fn routes(orchestrator: Orchestrator) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    api(orchestrator).or(health()).unify()
}

/// `GET /health`
pub fn health() -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path("health").and(warp::path::end()).and(warp::get()).map(|| {
        warp::reply::json(&json!({
            "status": "ok",
            "service": "daa",
            "version": daa_core::VERSION,
        }))
        .into_response()
    })
}

/// `POST /api` and `POST /api/`
pub fn api(orchestrator: Orchestrator) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::post()
        .and(api_path())
        .and(warp::query::<ApiQuery>())
        .and(task_body())
        .and(warp::any().map(move || orchestrator.clone()))
        .and_then(handle_api)
}

fn api_path() -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::path("api")
        .and(warp::path::tail())
        .and_then(|tail: Tail| async move {
            if tail.as_str().is_empty() {
                Ok(())
            } else {
                Err(warp::reject::not_found())
            }
        })
        .untuple_one()
}

fn task_body() -> impl Filter<Extract = (Result<TaskRequest, DAAError>,), Error = Rejection> + Clone {
    let multipart = warp::multipart::form()
        .max_length(MAX_BODY_BYTES)
        .then(|form: FormData| async move { first_part(form).await.and_then(|body| parse_task(None, &body)) });
    let plain = warp::body::content_length_limit(MAX_BODY_BYTES)
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::bytes())
        .map(|content_type: Option<String>, body: warp::hyper::body::Bytes| {
            parse_task(content_type.as_deref(), &body)
        });
    multipart.or(plain).unify()
}

async fn first_part(form: FormData) -> Result<Vec<u8>, DAAError> {
    let malformed = |e: warp::Error| DAAError::MalformedRequest(format!("unreadable multipart body: {e}"));
    let mut form = Box::pin(form);
    let Some(part) = form.try_next().await.map_err(malformed)? else {
        return Ok(Vec::new());
    };
    part.stream()
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(chunk.chunk());
            Ok(acc)
        })
        .await
        .map_err(malformed)
}

async fn handle_api(
    query: ApiQuery,
    task: Result<TaskRequest, DAAError>,
    orchestrator: Orchestrator,
) -> Result<Response, Infallible> {
    let task = match task {
        Ok(task) => task,
        Err(e) => {
            tracing::info!("Rejected request: {}", e);
            return Ok(error_reply(&e));
        }
    };
    let timeout_ms = query
        .timeout_ms
        .or(task.timeout_ms)
        .filter(|ms| *ms > 0)
        .unwrap_or(orchestrator.config().default_timeout_ms);

    match orchestrator.handle(&task.text, timeout_ms).await {
        Ok(answer) => Ok(warp::reply::json(&answer).into_response()),
        Err(e) => {
            tracing::warn!("Request failed ({}): {}", e.kind(), e);
            Ok(error_reply(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn raw_text_body() {
        let task = parse_task(Some("text/plain"), b"  How many rows?\n").unwrap();
        assert_eq!(task.text, "How many rows?");
        assert_eq!(task.timeout_ms, None);
    }

    #[test]
    fn json_string_and_object_bodies() {
        assert_eq!(parse_task(None, br#""Who won?""#).unwrap().text, "Who won?");

        let task = parse_task(Some("application/json"), br#"{"question": "Who won?", "timeout_ms": 900}"#).unwrap();
        assert_eq!(task.text, "Who won?");
        assert_eq!(task.timeout_ms, Some(900));

        let task = parse_task(None, br#"{"questions": ["Who?", "When?"]}"#).unwrap();
        assert_eq!(task.text, "1. Who?\n2. When?");
    }

    #[test]
    fn brace_prefixed_text_falls_back_to_raw() {
        let task = parse_task(None, b"{draft} How many?").unwrap();
        assert_eq!(task.text, "{draft} How many?");
    }

    #[test]
    fn malformed_bodies() {
        for (ct, body) in [
            (None, &b"   "[..]),
            (None, &[0xff, 0xfe][..]),
            (Some("application/json"), &b"{not json"[..]),
            (None, &br#"{"other": 1}"#[..]),
        ] {
            let err = parse_task(ct, body).unwrap_err();
            assert_eq!(err.kind(), "malformed_request");
        }
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_for(&DAAError::MalformedRequest(String::new())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&DAAError::Authentication(String::new())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&DAAError::Timeout { timeout_ms: 1 }), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(&DAAError::Internal(String::new())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
