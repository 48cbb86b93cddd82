//! Request handling: request ids and argument extraction.
//!
//! # Responsibilities
//! - Generate a UUID request id for every inbound request
//! - Turn the query string and body into one flat argument map
//!
//! # Design Decisions
//! - Request id added as early as possible for tracing
//! - Body args are a JSON object or a form; for writes they override the query
//! - Scalar values arrive as strings; endpoints coerce what they need

use axum::http::{HeaderValue, Request};
use serde_json::Value;
use tower_http::request_id::{MakeRequestId, RequestId};
use url::form_urlencoded;
use uuid::Uuid;

use crate::endpoint::{Args, Verb};
use crate::http::response::ApiError;

/// Header carrying the request id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Issues a fresh UUID v4 per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Arguments from a query string. A repeated key keeps its last value.
pub fn query_args(query: Option<&str>) -> Args {
    let mut args = Args::new();
    for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        args.insert(key.into_owned(), Value::String(value.into_owned()));
    }
    args
}

/// Arguments from a request body, by content type.
pub fn body_args(content_type: Option<&str>, body: &[u8]) -> Result<Args, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Args::new());
    }

    let is_json = content_type.is_some_and(|ct| {
        ct.split(';')
            .next()
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
    });
    if !is_json {
        let text = String::from_utf8_lossy(body);
        return Ok(query_args(Some(text.trim())));
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(args)) => Ok(args),
        Ok(other) => Err(ApiError::bad_request("Request body must be a JSON object.")
            .with_context("body_type", json_type(&other))),
        Err(e) => Err(ApiError::bad_request("Request body is not valid JSON.")
            .with_context("parse_error", e.to_string())),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The argument map handed to endpoints.
///
/// GET (and unknown verbs) see only the query. Writes see the query merged
/// with the body, body values winning on key clashes.
pub fn request_args(
    verb: Verb,
    query: Option<&str>,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<Args, ApiError> {
    let mut args = query_args(query);
    if matches!(verb, Verb::Post | Verb::Patch | Verb::Put | Verb::Delete) {
        args.extend(body_args(content_type, body)?);
    }
    Ok(args)
}
