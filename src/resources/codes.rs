//! Airports and carriers: code-keyed lookup tables.

use serde_json::{json, Value};

use crate::config::PaginationConfig;
use crate::endpoint::{Endpoint, Handler, RequestContext};
use crate::http::response::{ApiError, ApiResponse, ApiResult};
use crate::pagination::{Collection, LinkUri, Paginator};
use crate::resources::record_text;
use crate::routing::{RegistryBuilder, RegistryError};
use crate::store::{bind, Record};

/// A table of named entities keyed by a short code.
#[derive(Debug, Clone, Copy)]
pub struct CodeTable {
    pub location: &'static str,
    pub table: &'static str,
    /// Column holding the code; also the statistics filter key.
    pub code_column: &'static str,
    pub noun: &'static str,
}

pub const AIRPORTS: CodeTable = CodeTable {
    location: "/airports",
    table: "airports",
    code_column: "airport_code",
    noun: "airport",
};

pub const CARRIERS: CodeTable = CodeTable {
    location: "/carriers",
    table: "carriers",
    code_column: "carrier_code",
    noun: "carrier",
};

impl Collection for CodeTable {
    fn table(&self) -> &str {
        self.table
    }

    fn item_link(&self, path: &str, record: &Record) -> Option<String> {
        Some(format!("{path}/{}", record_text(record, self.code_column)))
    }
}

/// GET handler for a single entity by code.
#[derive(Debug, Clone, Copy)]
struct CodeLookup(CodeTable);

impl Handler for CodeLookup {
    fn handle(&self, request: &RequestContext<'_>) -> ApiResult {
        let table = self.0;
        let code = request.path_arg("code")?;

        let sql = format!("SELECT * FROM {} WHERE {} = :code", table.table, table.code_column);
        let record = request
            .store
            .with_session(|s| s.fetch_one(&sql, &bind([(":code", json!(code))])))?;

        let Some(record) = record else {
            return Err(
                ApiError::not_found(format!("No {} found with code '{code}'.", table.noun))
                    .with_context("code", code)
                    .with_link("collection", table.location),
            );
        };

        let statistics = LinkUri::new("/statistics").with(table.code_column, code);
        Ok(ApiResponse::ok(Value::Object(record))
            .with_link("self", format!("{}/{code}", table.location))
            .with_link("statistics", statistics.to_string()))
    }
}

pub(crate) fn register(builder: &mut RegistryBuilder, pagination: PaginationConfig) -> Result<(), RegistryError> {
    for table in [AIRPORTS, CARRIERS] {
        builder
            .register(Endpoint::at(table.location)?.get(Paginator::new(table, pagination)))
            .register(Endpoint::at(&format!("{}/{{code}}", table.location))?.get(CodeLookup(table)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Args;
    use crate::http::response::ErrorKind;
    use crate::routing::PathArgs;
    use crate::store::{schema, Store};
    use axum::http::StatusCode;

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        schema::bootstrap(&store).unwrap();
        store
            .with_session(|s| {
                s.execute_batch(
                    "INSERT INTO airports (airport_code, airport_name) VALUES ('ATL', 'Atlanta'), ('BOS', 'Boston');",
                )
            })
            .unwrap();
        store
    }

    fn lookup(store: &Store, code: &str) -> ApiResult {
        let path_args: PathArgs = [("code", code)].into_iter().collect();
        let uri = format!("/airports/{code}");
        CodeLookup(AIRPORTS).handle(&RequestContext {
            raw_uri: &uri,
            path_args: &path_args,
            args: &Args::new(),
            store,
        })
    }

    #[test]
    fn test_lookup_found() {
        let response = lookup(&store(), "BOS").unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.payload["airport_name"], "Boston");
        assert_eq!(response.links["statistics"], "/statistics?airport_code=BOS");
    }

    #[test]
    fn test_lookup_absent_is_not_found() {
        let err = lookup(&store(), "ORD").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.context["code"], "ORD");
    }

    #[test]
    fn test_collection_item_links() {
        let store = store();
        let args = Args::new();
        let path_args = PathArgs::default();
        let response = Paginator::new(AIRPORTS, PaginationConfig::default())
            .handle(&RequestContext {
                raw_uri: "/airports",
                path_args: &path_args,
                args: &args,
                store: &store,
            })
            .unwrap();
        assert_eq!(response.payload[1]["links"]["self"], "/airports/BOS");
    }
}
