//! Resource wiring for the airline statistics API.
//!
//! # Responsibilities
//! - Declare every endpoint (template, verbs, mandatory keys)
//! - Describe each paginated collection (table, columns, filters, links)
//! - Implement the statistic parent+child write contract
//!
//! # Endpoints
//! - `/airports`, `/airports/{code}`, `/carriers`, `/carriers/{code}`
//! - `/statistics` and `/statistics/{flights,delays,minutes_delayed}`
//! - `/aggregate_carrier_statistics/{airport_1_code}/{airport_2_code}`
//! - `/users`, `/users/{id}`, `/users/{id}/requests`

pub mod aggregate;
pub mod codes;
pub mod statistics;
pub mod users;

use serde_json::Value;

use crate::config::PaginationConfig;
use crate::endpoint::Args;
use crate::http::response::ApiError;
use crate::routing::{Registry, RegistryBuilder, RegistryError};
use crate::store::Record;

/// Build the frozen registry of every API endpoint.
pub fn build_registry(pagination: PaginationConfig) -> Result<Registry, RegistryError> {
    let mut builder = RegistryBuilder::new();
    codes::register(&mut builder, pagination)?;
    statistics::register(&mut builder, pagination)?;
    aggregate::register(&mut builder)?;
    users::register(&mut builder, pagination)?;
    builder.build()
}

/// Parse an integer argument given either as a JSON number or a string.
pub(crate) fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A required integer argument; 400 when missing or malformed.
pub(crate) fn integer_arg(args: &Args, key: &str) -> Result<i64, ApiError> {
    let value = args.get(key).unwrap_or(&Value::Null);
    parse_integer(value).ok_or_else(|| {
        ApiError::bad_request(format!("Parameter '{key}' must be an integer."))
            .with_context("parameter", key)
            .with_context("value", value.clone())
    })
}

/// A record field rendered for use inside a URI.
pub(crate) fn record_text(record: &Record, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
