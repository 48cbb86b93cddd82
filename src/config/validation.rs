//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits ordered)
//! - Validate addresses and URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ApiConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::ApiConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ApiConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    match Url::parse(&config.api.public_host) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        _ => errors.push(ValidationError::new(
            "api.public_host",
            format!("'{}' is not an absolute http(s) URL", config.api.public_host),
        )),
    }

    let root = &config.api.root;
    if !root.is_empty() && (!root.starts_with('/') || root.ends_with('/')) {
        errors.push(ValidationError::new(
            "api.root",
            "must be empty or start with '/' and not end with '/'",
        ));
    }

    let pagination = &config.pagination;
    if pagination.default_limit == 0 {
        errors.push(ValidationError::new("pagination.default_limit", "must be at least 1"));
    }
    if pagination.default_limit > pagination.max_limit {
        errors.push(ValidationError::new(
            "pagination.max_limit",
            format!(
                "{} is below default_limit {}",
                pagination.max_limit, pagination.default_limit
            ),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
