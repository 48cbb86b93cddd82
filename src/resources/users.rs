//! API users (client addresses) and their logged requests.

use serde_json::{json, Value};

use crate::config::PaginationConfig;
use crate::endpoint::{Endpoint, RequestContext};
use crate::http::response::{ApiError, ApiResponse, ApiResult, Links};
use crate::pagination::{Collection, ConditionBuilder, Conjunct, Paginator};
use crate::resources::{parse_integer, record_text};
use crate::routing::{RegistryBuilder, RegistryError};
use crate::store::{bind, Record};

pub const LOCATION: &str = "/users";

#[derive(Debug, Clone, Copy)]
struct Users;

impl Collection for Users {
    fn table(&self) -> &str {
        "users"
    }

    fn item_link(&self, path: &str, record: &Record) -> Option<String> {
        Some(format!("{path}/{}", record_text(record, "id")))
    }

    fn related_links(&self, record: &Record) -> Links {
        Links::from([(
            "requests".to_string(),
            format!("{LOCATION}/{}/requests", record_text(record, "id")),
        )])
    }
}

/// The `{id}` path argument as an integer; 400 otherwise.
fn user_id(request: &RequestContext<'_>) -> Result<i64, ApiError> {
    let raw = request.path_arg("id")?;
    parse_integer(&Value::from(raw)).ok_or_else(|| {
        ApiError::bad_request("User id must be an integer.")
            .with_context("parameter", "id")
            .with_context("value", raw)
    })
}

/// Requests logged for one user; always filtered by the path's user id.
#[derive(Debug, Clone, Copy)]
struct UserRequests;

impl Collection for UserRequests {
    fn table(&self) -> &str {
        "user_requests"
    }

    fn conditions(&self, request: &RequestContext<'_>) -> Result<ConditionBuilder, ApiError> {
        let mut builder = ConditionBuilder::new();
        builder.add_conjunct(Conjunct::new("user_id = :user_id", [("user_id", json!(user_id(request)?))]));
        Ok(builder)
    }

    fn item_link(&self, _path: &str, _record: &Record) -> Option<String> {
        None
    }

    fn related_links(&self, record: &Record) -> Links {
        Links::from([(
            "user".to_string(),
            format!("{LOCATION}/{}", record_text(record, "user_id")),
        )])
    }
}

fn user(request: &RequestContext<'_>) -> ApiResult {
    let id = user_id(request)?;
    let record = request
        .store
        .with_session(|s| s.fetch_one("SELECT * FROM users WHERE id = :id", &bind([(":id", json!(id))])))?;

    match record {
        Some(record) => Ok(ApiResponse::ok(Value::Object(record))
            .with_link("requests", format!("{LOCATION}/{id}/requests"))),
        None => Err(ApiError::not_found(format!("No user found with id {id}."))
            .with_context("id", id)
            .with_link("collection", LOCATION)),
    }
}

pub(crate) fn register(builder: &mut RegistryBuilder, pagination: PaginationConfig) -> Result<(), RegistryError> {
    builder
        .register(Endpoint::at(LOCATION)?.get(Paginator::new(Users, pagination)))
        .register(Endpoint::at("/users/{id}")?.get(user))
        .register(Endpoint::at("/users/{id}/requests")?.get(Paginator::new(UserRequests, pagination)));
    Ok(())
}
