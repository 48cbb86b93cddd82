//! Monthly airport/carrier statistics and their detail sub-resources.
//!
//! # Responsibilities
//! - Paginated, filterable listing of statistics and each detail table
//! - Parent creation (`POST /statistics`)
//! - Detail writes (`POST` / `PATCH` / `DELETE /statistics/<detail>`)
//!
//! # Design Decisions
//! - A statistic (parent) is identified by airport code, carrier code, year
//!   and month; detail rows (children) are keyed by the parent's id
//! - Parent lookup/creation, the child existence check and the child write
//!   share one transaction; the parent step is an `ON CONFLICT DO NOTHING`
//!   insert, so concurrent identical writes leave exactly one parent row
//! - The composite statistic cannot be patched or deleted directly

use serde_json::{json, Value};

use crate::config::PaginationConfig;
use crate::endpoint::{Args, Endpoint, Handler, RequestContext, Verb};
use crate::http::response::{ApiError, ApiResponse, ApiResult, Links};
use crate::pagination::{Collection, ConditionBuilder, LinkUri, Paginator};
use crate::resources::{integer_arg, record_text};
use crate::routing::{RegistryBuilder, RegistryError};
use crate::store::{bind, BoundValues, Record, Session};

pub const LOCATION: &str = "/statistics";

/// Keys that identify one statistic.
pub const IDENTITY_KEYS: [&str; 4] = ["airport_code", "carrier_code", "year", "month"];

const BASE_TABLE: &str = "statistics \
    JOIN airports ON statistics.airport_id = airports.id \
    JOIN carriers ON statistics.carrier_id = carriers.id";

const BASE_COLUMNS: [&str; 5] = [
    "statistics.id",
    "airports.airport_code",
    "carriers.carrier_code",
    "statistics.time_year AS year",
    "statistics.time_month AS month",
];

/// One detail table hanging off a statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticDetail {
    /// Sub-resource name under `/statistics`.
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

pub const FLIGHTS: StatisticDetail = StatisticDetail {
    name: "flights",
    table: "statistics_flights",
    columns: &["cancelled", "on_time", "delayed", "diverted", "total"],
};

pub const DELAYS: StatisticDetail = StatisticDetail {
    name: "delays",
    table: "statistics_delays",
    columns: &["late_aircraft", "weather", "security", "national_aviation_system", "carrier"],
};

pub const MINUTES_DELAYED: StatisticDetail = StatisticDetail {
    name: "minutes_delayed",
    table: "statistics_minutes_delayed",
    columns: &["late_aircraft", "weather", "carrier", "security", "total", "national_aviation_system"],
};

pub const DETAILS: [StatisticDetail; 3] = [FLIGHTS, DELAYS, MINUTES_DELAYED];

impl StatisticDetail {
    pub fn location(&self) -> String {
        format!("{LOCATION}/{}", self.name)
    }
}

/// Links to every detail sub-resource.
fn detail_links() -> Links {
    DETAILS
        .iter()
        .map(|detail| (detail.name.to_string(), detail.location()))
        .collect()
}

/// Statistics listing, optionally joined with one detail table.
#[derive(Debug, Clone)]
struct StatisticsCollection {
    from: String,
    columns: Vec<&'static str>,
}

impl StatisticsCollection {
    fn parent() -> Self {
        Self {
            from: BASE_TABLE.to_string(),
            columns: BASE_COLUMNS.to_vec(),
        }
    }

    fn detail(detail: StatisticDetail) -> Self {
        let mut columns = BASE_COLUMNS.to_vec();
        columns.extend(detail.columns);
        Self {
            from: format!(
                "{BASE_TABLE} JOIN {table} ON {table}.statistic_id = statistics.id",
                table = detail.table
            ),
            columns,
        }
    }
}

impl Collection for StatisticsCollection {
    fn table(&self) -> &str {
        &self.from
    }

    fn columns(&self) -> &[&str] {
        &self.columns
    }

    fn conditions(&self, request: &RequestContext<'_>) -> Result<ConditionBuilder, ApiError> {
        let args = normalized_filters(request.args)?;
        let mut builder = ConditionBuilder::new();
        builder.add_conjunct_if_keys_exist("airports.airport_code = :airport_code", &["airport_code"], &args);
        builder.add_conjunct_if_keys_exist("carriers.carrier_code = :carrier_code", &["carrier_code"], &args);
        builder.add_conjunct_if_keys_exist("statistics.time_year = :year", &["year"], &args);
        builder.add_conjunct_if_keys_exist("statistics.time_month = :month", &["month"], &args);
        Ok(builder)
    }

    fn item_link(&self, path: &str, record: &Record) -> Option<String> {
        let mut link = LinkUri::new(path);
        for key in IDENTITY_KEYS {
            link.set(key, record_text(record, key));
        }
        Some(link.to_string())
    }

    fn related_links(&self, record: &Record) -> Links {
        Links::from([
            ("airport".to_string(), format!("/airports/{}", record_text(record, "airport_code"))),
            ("carrier".to_string(), format!("/carriers/{}", record_text(record, "carrier_code"))),
        ])
    }
}

/// Copy of `args` with `year` / `month` coerced to integers when present.
fn normalized_filters(args: &Args) -> Result<Args, ApiError> {
    let mut normalized = args.clone();
    for key in ["year", "month"] {
        if args.contains_key(key) {
            normalized.insert(key.to_string(), json!(integer_arg(args, key)?));
        }
    }
    Ok(normalized)
}

/// The natural key of a statistic, parsed from request arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub airport_code: String,
    pub carrier_code: String,
    pub year: i64,
    pub month: i64,
}

impl Identity {
    pub fn from_args(args: &Args) -> Result<Self, ApiError> {
        let text = |key: &str| match args.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            other => Err(ApiError::bad_request(format!("Parameter '{key}' must be a code."))
                .with_context("parameter", key)
                .with_context("value", other.cloned().unwrap_or(Value::Null))),
        };
        Ok(Self {
            airport_code: text("airport_code")?,
            carrier_code: text("carrier_code")?,
            year: integer_arg(args, "year")?,
            month: integer_arg(args, "month")?,
        })
    }

    /// Relative URI of this statistic within `path`.
    pub fn link(&self, path: &str) -> String {
        LinkUri::new(path)
            .with("airport_code", &self.airport_code)
            .with("carrier_code", &self.carrier_code)
            .with("year", self.year)
            .with("month", self.month)
            .to_string()
    }

    fn bound(&self) -> BoundValues {
        bind([
            (":airport_code", json!(self.airport_code)),
            (":carrier_code", json!(self.carrier_code)),
            (":year", json!(self.year)),
            (":month", json!(self.month)),
        ])
    }
}

/// Outcome of the parent step of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRow {
    Created(i64),
    Existing(i64),
}

impl ParentRow {
    pub fn id(self) -> i64 {
        match self {
            ParentRow::Created(id) | ParentRow::Existing(id) => id,
        }
    }
}

fn code_id(tx: &Session<'_>, table: &str, column: &str, noun: &str, code: &str) -> Result<i64, ApiError> {
    let sql = format!("SELECT id FROM {table} WHERE {column} = :code");
    let row = tx.fetch_one(&sql, &bind([(":code", json!(code))]))?;
    row.and_then(|r| r.get("id").and_then(Value::as_i64)).ok_or_else(|| {
        ApiError::not_found(format!("No {noun} found with code '{code}'."))
            .with_context(column.to_string(), code)
            .with_link(format!("{noun}s"), format!("/{table}"))
    })
}

/// Id of the existing statistic for `identity`, if any.
fn find_parent(tx: &Session<'_>, identity: &Identity) -> Result<Option<i64>, ApiError> {
    let row = tx.fetch_one(
        "SELECT statistics.id FROM statistics
         JOIN airports ON statistics.airport_id = airports.id
         JOIN carriers ON statistics.carrier_id = carriers.id
         WHERE airports.airport_code = :airport_code AND carriers.carrier_code = :carrier_code
           AND statistics.time_year = :year AND statistics.time_month = :month",
        &identity.bound(),
    )?;
    Ok(row.and_then(|r| r.get("id").and_then(Value::as_i64)))
}

/// Create the statistic for `identity`, or report the one already present.
pub fn upsert_parent(tx: &Session<'_>, identity: &Identity) -> Result<ParentRow, ApiError> {
    let airport_id = code_id(tx, "airports", "airport_code", "airport", &identity.airport_code)?;
    let carrier_id = code_id(tx, "carriers", "carrier_code", "carrier", &identity.carrier_code)?;

    let inserted = tx.execute(
        "INSERT INTO statistics (airport_id, carrier_id, time_label, time_year, time_month)
         VALUES (:airport_id, :carrier_id, :label, :year, :month)
         ON CONFLICT (airport_id, carrier_id, time_year, time_month) DO NOTHING",
        &bind([
            (":airport_id", json!(airport_id)),
            (":carrier_id", json!(carrier_id)),
            (":label", json!(format!("{}/{}", identity.year, identity.month))),
            (":year", json!(identity.year)),
            (":month", json!(identity.month)),
        ]),
    )?;
    if inserted == 1 {
        return Ok(ParentRow::Created(tx.last_insert_id()));
    }

    find_parent(tx, identity)?
        .map(ParentRow::Existing)
        .ok_or_else(|| ApiError::internal("Statistic vanished after conflicting insert."))
}

fn child_exists(tx: &Session<'_>, detail: StatisticDetail, statistic_id: i64) -> Result<bool, ApiError> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE statistic_id = :statistic_id", detail.table);
    Ok(tx.count(&sql, &bind([(":statistic_id", json!(statistic_id))]))? > 0)
}

/// Detail columns present in `args`, parsed as integers.
fn detail_values(detail: StatisticDetail, args: &Args) -> Result<Vec<(&'static str, i64)>, ApiError> {
    detail
        .columns
        .iter()
        .filter(|column| args.get(**column).is_some_and(|v| !v.is_null()))
        .map(|column| integer_arg(args, column).map(|value| (*column, value)))
        .collect()
}

/// `POST /statistics`: create a parent with no detail rows.
fn create_statistic(request: &RequestContext<'_>) -> ApiResult {
    let identity = Identity::from_args(request.args)?;
    let parent = request
        .store
        .with_session(|s| s.transaction(|tx| upsert_parent(tx, &identity)))?;

    match parent {
        ParentRow::Created(id) => {
            tracing::info!(statistic_id = id, "Statistic created");
            Ok(ApiResponse::created(json!({ "message": "Resource created.", "id": id }))
                .with_link("self", identity.link(LOCATION))
                .with_links(detail_links()))
        }
        ParentRow::Existing(id) => Err(ApiError::conflict("Statistic already exists.")
            .with_context("id", id)
            .with_link("existing", identity.link(LOCATION))),
    }
}

/// `PATCH` / `DELETE /statistics`: only the detail sub-resources are writable.
fn forbid_composite_write(_request: &RequestContext<'_>) -> ApiResult {
    let mut err = ApiError::forbidden(
        "A statistic cannot be modified directly; modify one of its sub-resources instead.",
    );
    err.links = detail_links();
    Err(err)
}

#[derive(Debug, Clone, Copy)]
enum DetailOp {
    Create,
    Update,
    Remove,
}

/// Writes against one detail table.
#[derive(Debug, Clone, Copy)]
struct DetailWrite {
    detail: StatisticDetail,
    op: DetailOp,
}

impl DetailWrite {
    fn create(&self, request: &RequestContext<'_>, identity: &Identity) -> ApiResult {
        let detail = self.detail;
        let values = detail_values(detail, request.args)?;

        let parent = request.store.with_session(|s| {
            s.transaction(|tx| -> Result<ParentRow, ApiError> {
                let parent = upsert_parent(tx, identity)?;
                if child_exists(tx, detail, parent.id())? {
                    return Err(ApiError::conflict("Resource already exists.")
                        .with_context("statistic_id", parent.id())
                        .with_link("existing", identity.link(&detail.location())));
                }

                let mut columns = vec!["statistic_id"];
                let mut bound = bind([(":statistic_id", json!(parent.id()))]);
                for (column, value) in &values {
                    columns.push(*column);
                    bound.insert(format!(":{column}"), json!(value));
                }
                let placeholders: Vec<String> = columns.iter().map(|c| format!(":{c}")).collect();
                tx.execute(
                    &format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        detail.table,
                        columns.join(", "),
                        placeholders.join(", ")
                    ),
                    &bound,
                )?;
                Ok(parent)
            })
        })?;

        tracing::info!(
            detail = detail.name,
            statistic_id = parent.id(),
            parent_created = matches!(parent, ParentRow::Created(_)),
            "Statistic detail created"
        );
        Ok(ApiResponse::created(json!({
            "message": "Resource created.",
            "statistic_id": parent.id(),
            "parent_created": matches!(parent, ParentRow::Created(_)),
        }))
        .with_link("self", identity.link(&detail.location()))
        .with_link("statistic", identity.link(LOCATION)))
    }

    fn update(&self, request: &RequestContext<'_>, identity: &Identity) -> ApiResult {
        let detail = self.detail;
        let values = detail_values(detail, request.args)?;
        if values.is_empty() {
            return Err(ApiError::bad_request("No fields to update were given.")
                .with_context("updatable_fields", json!(detail.columns)));
        }

        let statistic_id = request.store.with_session(|s| {
            s.transaction(|tx| -> Result<i64, ApiError> {
                let statistic_id = self.existing_child(tx, identity)?;
                let assignments: Vec<String> = values.iter().map(|(c, _)| format!("{c} = :{c}")).collect();
                let mut bound = bind([(":statistic_id", json!(statistic_id))]);
                bound.extend(values.iter().map(|(c, v)| (format!(":{c}"), json!(v))));
                tx.execute(
                    &format!(
                        "UPDATE {} SET {} WHERE statistic_id = :statistic_id",
                        detail.table,
                        assignments.join(", ")
                    ),
                    &bound,
                )?;
                Ok(statistic_id)
            })
        })?;

        let updated: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
        Ok(ApiResponse::ok(json!({
            "message": "Resource updated.",
            "statistic_id": statistic_id,
            "updated_fields": updated,
        }))
        .with_link("self", identity.link(&detail.location())))
    }

    fn remove(&self, request: &RequestContext<'_>, identity: &Identity) -> ApiResult {
        let detail = self.detail;
        let statistic_id = request.store.with_session(|s| {
            s.transaction(|tx| -> Result<i64, ApiError> {
                let statistic_id = self.existing_child(tx, identity)?;
                tx.execute(
                    &format!("DELETE FROM {} WHERE statistic_id = :statistic_id", detail.table),
                    &bind([(":statistic_id", json!(statistic_id))]),
                )?;
                Ok(statistic_id)
            })
        })?;

        tracing::info!(detail = detail.name, statistic_id, "Statistic detail deleted");
        Ok(ApiResponse::no_content("Resource deleted."))
    }

    /// The parent id, when both the parent and this detail row exist.
    fn existing_child(&self, tx: &Session<'_>, identity: &Identity) -> Result<i64, ApiError> {
        let not_found = || {
            ApiError::not_found("Resource does not exist.")
                .with_context("airport_code", identity.airport_code.as_str())
                .with_context("carrier_code", identity.carrier_code.as_str())
                .with_context("year", identity.year)
                .with_context("month", identity.month)
        };
        let statistic_id = find_parent(tx, identity)?.ok_or_else(not_found)?;
        if child_exists(tx, self.detail, statistic_id)? {
            Ok(statistic_id)
        } else {
            Err(not_found())
        }
    }
}

impl Handler for DetailWrite {
    fn handle(&self, request: &RequestContext<'_>) -> ApiResult {
        let identity = Identity::from_args(request.args)?;
        match self.op {
            DetailOp::Create => self.create(request, &identity),
            DetailOp::Update => self.update(request, &identity),
            DetailOp::Remove => self.remove(request, &identity),
        }
    }
}

pub(crate) fn register(builder: &mut RegistryBuilder, pagination: PaginationConfig) -> Result<(), RegistryError> {
    builder.register(
        Endpoint::at(LOCATION)?
            .get(Paginator::new(StatisticsCollection::parent(), pagination))
            .post(create_statistic)
            .patch(forbid_composite_write)
            .delete(forbid_composite_write)
            .requires(Verb::Post, &IDENTITY_KEYS),
    );

    for detail in DETAILS {
        let write = |op| DetailWrite { detail, op };
        builder.register(
            Endpoint::at(&detail.location())?
                .get(Paginator::new(StatisticsCollection::detail(detail), pagination))
                .post(write(DetailOp::Create))
                .patch(write(DetailOp::Update))
                .delete(write(DetailOp::Remove))
                .requires(Verb::Post, &IDENTITY_KEYS)
                .requires(Verb::Patch, &IDENTITY_KEYS)
                .requires(Verb::Delete, &IDENTITY_KEYS),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
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
                    "INSERT INTO airports (airport_code, airport_name) VALUES ('ATL', 'Atlanta');
                     INSERT INTO carriers (carrier_code, carrier_name) VALUES ('AA', 'American');",
                )
            })
            .unwrap();
        store
    }

    fn args(value: Value) -> Args {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn identity_args(extra: Value) -> Args {
        let mut args = args(json!({
            "airport_code": "ATL",
            "carrier_code": "AA",
            "year": "2004",
            "month": "6",
        }));
        args.extend(self::args(extra));
        args
    }

    fn call(handler: &dyn Handler, store: &Store, args: &Args) -> ApiResult {
        let path_args = PathArgs::default();
        handler.handle(&RequestContext {
            raw_uri: "/statistics/flights",
            path_args: &path_args,
            args,
            store,
        })
    }

    fn count(store: &Store, sql: &str) -> i64 {
        store.with_session(|s| s.count(sql, &BoundValues::new())).unwrap()
    }

    const POST: DetailWrite = DetailWrite { detail: FLIGHTS, op: DetailOp::Create };
    const PATCH: DetailWrite = DetailWrite { detail: FLIGHTS, op: DetailOp::Update };
    const DELETE: DetailWrite = DetailWrite { detail: FLIGHTS, op: DetailOp::Remove };

    #[test]
    fn test_identity_requires_integer_period() {
        let err = Identity::from_args(&identity_args(json!({ "year": "last" }))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRequest);
        assert_eq!(err.context["parameter"], "year");

        let identity = Identity::from_args(&identity_args(json!({}))).unwrap();
        assert_eq!(
            identity.link("/statistics"),
            "/statistics?airport_code=ATL&carrier_code=AA&year=2004&month=6"
        );
    }

    #[test]
    fn test_upsert_parent_reports_existing_row() {
        let store = store();
        let identity = Identity::from_args(&identity_args(json!({}))).unwrap();
        let upsert = || {
            store
                .with_session(|s| s.transaction(|tx| upsert_parent(tx, &identity)))
                .unwrap()
        };

        let first = upsert();
        assert!(matches!(first, ParentRow::Created(_)));
        assert_eq!(upsert(), ParentRow::Existing(first.id()));
        assert_eq!(count(&store, "SELECT COUNT(*) FROM statistics"), 1);
    }

    #[test]
    fn test_unknown_airport_is_not_found_and_writes_nothing() {
        let store = store();
        let err = call(&POST, &store, &identity_args(json!({ "airport_code": "ZZZ" }))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM statistics"), 0);
    }

    #[test]
    fn test_child_post_twice_conflicts_on_second_call() {
        let store = store();
        let request = identity_args(json!({ "total": 10, "delayed": "3" }));

        let created = call(&POST, &store, &request).unwrap();
        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(created.payload["parent_created"], true);
        let statistic_id = created.payload["statistic_id"].clone();

        let err = call(&POST, &store, &request).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.context["statistic_id"], statistic_id);

        assert_eq!(count(&store, "SELECT COUNT(*) FROM statistics"), 1);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM statistics_flights"), 1);
        assert_eq!(count(&store, "SELECT delayed FROM statistics_flights"), 3);
    }

    #[test]
    fn test_child_post_reuses_existing_parent() {
        let store = store();
        let parent = create_statistic(&RequestContext {
            raw_uri: "/statistics",
            path_args: &PathArgs::default(),
            args: &identity_args(json!({})),
            store: &store,
        })
        .unwrap();
        assert_eq!(parent.status, StatusCode::CREATED);

        let created = call(&POST, &store, &identity_args(json!({}))).unwrap();
        assert_eq!(created.payload["parent_created"], false);
        assert_eq!(created.payload["statistic_id"], parent.payload["id"]);
    }

    #[test]
    fn test_parent_post_twice_conflicts() {
        let store = store();
        let request = identity_args(json!({}));
        let path_args = PathArgs::default();
        let context = RequestContext {
            raw_uri: "/statistics",
            path_args: &path_args,
            args: &request,
            store: &store,
        };
        assert!(create_statistic(&context).is_ok());
        assert_eq!(create_statistic(&context).unwrap_err().kind, ErrorKind::Conflict);
    }

    #[test]
    fn test_patch_missing_child_is_not_found() {
        let store = store();
        let err = call(&PATCH, &store, &identity_args(json!({ "total": 5 }))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM statistics"), 0);
    }

    #[test]
    fn test_patch_then_delete_child() {
        let store = store();
        call(&POST, &store, &identity_args(json!({ "total": 10 }))).unwrap();

        let err = call(&PATCH, &store, &identity_args(json!({}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRequest);

        let patched = call(&PATCH, &store, &identity_args(json!({ "total": 12 }))).unwrap();
        assert_eq!(patched.payload["updated_fields"], json!(["total"]));
        assert_eq!(count(&store, "SELECT total FROM statistics_flights"), 12);

        let deleted = call(&DELETE, &store, &identity_args(json!({}))).unwrap();
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM statistics_flights"), 0);
        assert_eq!(count(&store, "SELECT COUNT(*) FROM statistics"), 1);

        let err = call(&DELETE, &store, &identity_args(json!({}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_composite_write_is_forbidden_with_sub_resource_links() {
        let store = store();
        let err = call(&forbid_composite_write, &store, &Args::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Forbidden);
        assert_eq!(err.links["flights"], "/statistics/flights");
        assert_eq!(err.links["delays"], "/statistics/delays");
        assert_eq!(err.links["minutes_delayed"], "/statistics/minutes_delayed");
    }

    #[test]
    fn test_statistics_item_links() {
        let collection = StatisticsCollection::detail(DELAYS);
        let record: Record = args(json!({
            "id": 1, "airport_code": "ATL", "carrier_code": "AA", "year": 2004, "month": 6
        }));
        assert_eq!(
            collection.item_link("/statistics/delays", &record).unwrap(),
            "/statistics/delays?airport_code=ATL&carrier_code=AA&year=2004&month=6"
        );
        assert_eq!(collection.related_links(&record)["carrier"], "/carriers/AA");
        assert!(collection.table().contains("JOIN statistics_delays"));
    }
}
