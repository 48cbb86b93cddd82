//! Handler results and the error taxonomy.
//!
//! # Responsibilities
//! - Carry a status, a JSON payload and relative links out of a handler
//! - Map error kinds to HTTP status codes
//! - Turn store failures into 500s with optional backend diagnostics
//!
//! # Design Decisions
//! - Errors are values (`ApiResult`), never panics
//! - Links stay relative until the router globalizes them
//! - An `ApiError` renders as a payload of `{error_message, context}`

use std::collections::BTreeMap;
use std::fmt;

use axum::http::StatusCode;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::store::StoreError;

/// Relation name → relative URI.
pub type Links = BTreeMap<String, String>;

/// Result of running a verb handler.
pub type ApiResult = Result<ApiResponse, ApiError>;

/// A successful handler outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub payload: Value,
    pub links: Links,
}

impl ApiResponse {
    pub fn new(status: StatusCode, payload: Value) -> Self {
        Self {
            status,
            payload,
            links: Links::new(),
        }
    }

    /// 200 with the given payload.
    pub fn ok(payload: Value) -> Self {
        Self::new(StatusCode::OK, payload)
    }

    /// 201 with the given payload.
    pub fn created(payload: Value) -> Self {
        Self::new(StatusCode::CREATED, payload)
    }

    /// 204. The confirmation message stays in the payload; the wire body is empty.
    pub fn no_content(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NO_CONTENT, json!({ "message": message.into() }))
    }

    pub fn with_link(mut self, rel: impl Into<String>, href: impl Into<String>) -> Self {
        self.links.insert(rel.into(), href.into());
        self
    }

    pub fn with_links(mut self, links: impl IntoIterator<Item = (String, String)>) -> Self {
        self.links.extend(links);
        self
    }
}

/// Error classes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No route matched, or an identified resource is absent.
    NotFound,
    /// Unsupported verb, missing mandatory key, malformed argument.
    BadRequest,
    /// A resource with the same natural key already exists.
    Conflict,
    /// The operation is structurally disallowed on this resource.
    Forbidden,
    /// A store operation failed.
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A handler failure, with diagnostic context and remediation links.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: Map<String, Value>,
    pub links: Links,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Map::new(),
            links: Links::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_link(mut self, rel: impl Into<String>, href: impl Into<String>) -> Self {
        self.links.insert(rel.into(), href.into());
        self
    }

    /// Drop backend diagnostics from internal errors.
    pub fn redacted(mut self) -> Self {
        if self.kind == ErrorKind::Internal {
            self.context.clear();
        }
        self
    }

    /// Render as an error response: `{error_message, context}` plus links.
    pub fn into_response(self) -> ApiResponse {
        ApiResponse {
            status: self.kind.status(),
            payload: json!({
                "error_message": self.message,
                "context": Value::Object(self.context),
            }),
            links: self.links,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let code = err.code().map_or(Value::Null, Value::from);
        ApiError::internal("Database error occurred.")
            .with_context("db_error", err.to_string())
            .with_context("db_error_code", code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BoundValues, Store};

    #[test]
    fn test_error_payload_shape() {
        let response = ApiError::forbidden("Patch a sub-resource instead.")
            .with_context("attempted_method", "PATCH")
            .with_link("flights", "/statistics/flights")
            .into_response();

        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(
            response.payload,
            json!({
                "error_message": "Patch a sub-resource instead.",
                "context": { "attempted_method": "PATCH" }
            })
        );
        assert_eq!(response.links["flights"], "/statistics/flights");
    }

    #[test]
    fn test_kinds_map_to_statuses() {
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::BadRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorKind::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_store_error_becomes_internal_with_diagnostics() {
        let store = Store::open_in_memory().unwrap();
        let err: ApiError = store
            .with_session(|s| s.count("SELECT COUNT(*) FROM nowhere", &BoundValues::new()))
            .unwrap_err()
            .into();

        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.context["db_error"].as_str().unwrap().contains("nowhere"));
        assert!(err.context["db_error_code"].is_i64());

        let redacted = err.redacted();
        assert!(redacted.context.is_empty());
    }

    #[test]
    fn test_redaction_keeps_client_error_context() {
        let err = ApiError::bad_request("bad").with_context("missing_parameter", "month");
        assert_eq!(err.clone().redacted(), err);
    }
}
