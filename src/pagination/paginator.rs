//! Windowed collection handler.
//!
//! # Data Flow
//! ```text
//! RequestContext (args: page, limit, filters)
//!     → PageRequest::from_args (validate, clamp)
//!     → Collection::conditions (one ConditionBuilder)
//!     → read transaction: COUNT(*) and SELECT … LIMIT/OFFSET, same predicate
//!     → per-item links + page navigation links
//! ```

use serde_json::{json, Value};

use crate::config::PaginationConfig;
use crate::endpoint::{Args, Handler, RequestContext};
use crate::http::response::{ApiError, ApiResponse, ApiResult, Links};
use crate::pagination::condition::ConditionBuilder;
use crate::pagination::links::page_links;
use crate::pagination::DEFAULT_PAGE;
use crate::store::{Record, StoreError};

/// Validated `page` / `limit` for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Read `page` and `limit` from request arguments.
    ///
    /// Missing values take their defaults. Non-numeric, zero or negative
    /// values are rejected. A limit above `max_limit` is clamped.
    pub fn from_args(args: &Args, config: PaginationConfig) -> Result<Self, ApiError> {
        let page = positive_arg(args, "page")?.unwrap_or(i64::from(DEFAULT_PAGE));
        let limit = positive_arg(args, "limit")?
            .unwrap_or(i64::from(config.default_limit))
            .min(i64::from(config.max_limit));
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

fn positive_arg(args: &Args, key: &str) -> Result<Option<i64>, ApiError> {
    let parsed = match args.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    match parsed {
        Some(value) if value >= 1 => Ok(Some(value)),
        _ => Err(
            ApiError::bad_request(format!("Query parameter '{key}' must be a positive integer."))
                .with_context("parameter", key)
                .with_context("value", args.get(key).cloned().unwrap_or(Value::Null)),
        ),
    }
}

/// The window a page was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationState {
    pub page: i64,
    pub limit: i64,
    pub offset: i64,
    pub total_count: i64,
    pub page_count: i64,
}

impl PaginationState {
    pub fn new(request: PageRequest, total_count: i64) -> Self {
        let total_count = total_count.max(0);
        Self {
            page: request.page,
            limit: request.limit,
            offset: request.offset(),
            total_count,
            page_count: (total_count + request.limit - 1) / request.limit,
        }
    }
}

/// A filterable table exposed as a paginated collection.
pub trait Collection: Send + Sync {
    /// Table expression for the FROM clause, joins included.
    fn table(&self) -> &str;

    /// Selected columns; empty selects `*`.
    fn columns(&self) -> &[&str] {
        &[]
    }

    /// Filters derived from the request. Used for both COUNT and SELECT.
    fn conditions(&self, _request: &RequestContext<'_>) -> Result<ConditionBuilder, ApiError> {
        Ok(ConditionBuilder::new())
    }

    /// The item's `self` link, given the collection's request path.
    fn item_link(&self, path: &str, record: &Record) -> Option<String>;

    /// Further relations of one item, such as its airport or carrier.
    fn related_links(&self, _record: &Record) -> Links {
        Links::new()
    }
}

/// GET handler that windows a [`Collection`].
#[derive(Debug, Clone)]
pub struct Paginator<C> {
    collection: C,
    config: PaginationConfig,
}

impl<C: Collection> Paginator<C> {
    pub fn new(collection: C, config: PaginationConfig) -> Self {
        Self { collection, config }
    }

    fn select_sql(&self, conditions: &ConditionBuilder) -> String {
        let columns = match self.collection.columns() {
            [] => "*".to_string(),
            columns => columns.join(", "),
        };
        format!(
            "SELECT {columns} FROM {}{} LIMIT :page_limit OFFSET :page_offset",
            self.collection.table(),
            conditions.where_clause()
        )
    }

    fn count_sql(&self, conditions: &ConditionBuilder) -> String {
        format!(
            "SELECT COUNT(*) FROM {}{}",
            self.collection.table(),
            conditions.where_clause()
        )
    }

    fn with_item_links(&self, path: &str, mut record: Record) -> Value {
        let mut links = Links::new();
        if let Some(link) = self.collection.item_link(path, &record) {
            links.insert("self".into(), link);
        }
        links.extend(self.collection.related_links(&record));
        if !links.is_empty() {
            record.insert("links".into(), json!(links));
        }
        Value::Object(record)
    }
}

impl<C: Collection> Handler for Paginator<C> {
    fn handle(&self, request: &RequestContext<'_>) -> ApiResult {
        let page_request = PageRequest::from_args(request.args, self.config)?;
        let conditions = self.collection.conditions(request)?;

        let filter_values = conditions.build_bound_values();
        let mut page_values = filter_values.clone();
        page_values.insert(":page_limit".into(), json!(page_request.limit));
        page_values.insert(":page_offset".into(), json!(page_request.offset()));

        let count_sql = self.count_sql(&conditions);
        let select_sql = self.select_sql(&conditions);
        let (total_count, records) = request.store.with_session(|session| {
            session.transaction(|tx| {
                let total = tx.count(&count_sql, &filter_values)?;
                let records = tx.fetch_all(&select_sql, &page_values)?;
                Ok::<_, StoreError>((total, records))
            })
        })?;

        let state = PaginationState::new(page_request, total_count);
        tracing::debug!(
            table = self.collection.table().trim(),
            page = state.page,
            limit = state.limit,
            total_count = state.total_count,
            page_count = state.page_count,
            "Collection page fetched"
        );

        let path = request.path();
        let items: Vec<Value> = records
            .into_iter()
            .map(|record| self.with_item_links(path, record))
            .collect();

        Ok(ApiResponse::ok(Value::Array(items)).with_links(page_links(
            request.raw_uri,
            state.page,
            state.limit,
            state.page_count,
        )))
    }
}
