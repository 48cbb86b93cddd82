//! Request resolution, dispatch and envelope finalization.
//!
//! # Responsibilities
//! - Resolve a request URI against the frozen registry
//! - Dispatch by verb and notify the request-log sink
//! - Inject the `self` link and globalize every `links` map in the payload
//!
//! # Design Decisions
//! - Synchronous; the HTTP layer runs it on the blocking pool
//! - A failing request-log sink is logged and otherwise ignored
//! - Unmatched URIs answer with an index of every registered endpoint

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::endpoint::{Args, RequestContext, Verb};
use crate::http::response::{ApiError, ApiResult, ErrorKind};
use crate::observability::metrics;
use crate::routing::registry::{Registry, RouteMatch};
use crate::store::{RequestLog, Store};

/// Router-wide settings taken from configuration.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// `public_host + root`, prepended to every emitted link.
    pub link_prefix: String,
    /// Keep store diagnostics in 500 responses.
    pub expose_backend_errors: bool,
}

/// One inbound API call, already stripped of the API root.
#[derive(Debug, Clone, Copy)]
pub struct ApiRequest<'a> {
    pub verb: Verb,
    /// Path relative to the API root, query string included.
    pub uri: &'a str,
    /// Value of the `x-request-id` header.
    pub request_id: &'a str,
    pub args: &'a Args,
    pub client_address: Option<&'a str>,
}

/// Finalized response ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub status: StatusCode,
    /// `{content, links, response_time}`
    pub body: Value,
}

/// Resolves and dispatches API requests.
pub struct Router {
    registry: Registry,
    store: Store,
    settings: RouterSettings,
    request_log: Option<Arc<dyn RequestLog>>,
}

impl Router {
    pub fn new(registry: Registry, store: Store, settings: RouterSettings) -> Self {
        Self {
            registry,
            store,
            settings,
            request_log: None,
        }
    }

    /// Notify `log` once for every request that resolves to an endpoint.
    pub fn with_request_log(mut self, log: Arc<dyn RequestLog>) -> Self {
        self.request_log = Some(log);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Find the endpoint for `uri`, or a 404 listing every endpoint.
    pub fn resolve(&self, uri: &str) -> Result<RouteMatch<'_>, ApiError> {
        self.registry.resolve(uri).ok_or_else(|| {
            let available: Vec<String> = self
                .registry
                .uris()
                .into_iter()
                .map(|endpoint| format!("{}{endpoint}", self.settings.link_prefix))
                .collect();
            ApiError::not_found("Resource not found.")
                .with_context("requested_uri", uri)
                .with_context("available_resources", json!(available))
        })
    }

    /// Run the matched endpoint's handler for `verb`.
    pub fn dispatch(&self, route: &RouteMatch<'_>, verb: Verb, uri: &str, args: &Args) -> ApiResult {
        let request = RequestContext {
            raw_uri: uri,
            path_args: &route.path_args,
            args,
            store: &self.store,
        };
        route.endpoint.dispatch(verb, &request)
    }

    /// Build the wire envelope: inject `self`, globalize links, add timing.
    pub fn finalize(&self, result: ApiResult, uri: &str, request_id: &str, started: Instant) -> Envelope {
        let mut response = match result {
            Ok(response) => response,
            Err(err) => {
                if err.kind == ErrorKind::Internal {
                    tracing::error!(
                        request_id = %request_id,
                        uri = %uri,
                        error = %err,
                        context = ?err.context,
                        "Request failed with internal error"
                    );
                }
                if self.settings.expose_backend_errors {
                    err.into_response()
                } else {
                    err.redacted().into_response()
                }
            }
        };
        response
            .links
            .entry("self".to_string())
            .or_insert_with(|| uri.to_string());

        let mut body = json!({
            "content": response.payload,
            "links": response.links,
            "response_time": started.elapsed().as_secs_f64(),
        });
        globalize_links(&mut body, &self.settings.link_prefix);

        Envelope {
            status: response.status,
            body,
        }
    }

    /// Resolve, dispatch, log and finalize one request.
    pub fn respond(&self, request: &ApiRequest<'_>) -> Envelope {
        let started = Instant::now();
        let mut endpoint_label = "none";

        let result = match self.resolve(request.uri) {
            Ok(route) => {
                endpoint_label = route.endpoint.uri();
                tracing::debug!(
                    request_id = %request.request_id,
                    verb = %request.verb,
                    uri = %request.uri,
                    endpoint = %endpoint_label,
                    "Dispatching request"
                );
                let result = self.dispatch(&route, request.verb, request.uri, request.args);
                self.log_request(request, endpoint_label);
                result
            }
            Err(err) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    verb = %request.verb,
                    uri = %request.uri,
                    "No endpoint matched"
                );
                Err(err)
            }
        };

        let envelope = self.finalize(result, request.uri, request.request_id, started);
        metrics::record_request(
            request.verb.as_str(),
            envelope.status.as_u16(),
            endpoint_label,
            started,
        );
        envelope
    }

    fn log_request(&self, request: &ApiRequest<'_>, endpoint_uri: &str) {
        let Some(log) = &self.request_log else {
            return;
        };
        let address = request.client_address.unwrap_or("unknown");
        if let Err(e) = log.record(address, endpoint_uri, request.verb) {
            tracing::warn!(
                request_id = %request.request_id,
                client_address = %address,
                endpoint = %endpoint_uri,
                error = %e,
                "Failed to record request"
            );
        }
    }
}

/// Prefix every value of every `links` map in `value`, at any depth.
pub fn globalize_links(value: &mut Value, prefix: &str) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "links" {
                    prefix_link_values(child, prefix);
                } else {
                    globalize_links(child, prefix);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                globalize_links(item, prefix);
            }
        }
        _ => {}
    }
}

fn prefix_link_values(links: &mut Value, prefix: &str) {
    match links {
        Value::Object(map) => {
            for link in map.values_mut() {
                match link {
                    Value::String(href) => href.insert_str(0, prefix),
                    other => globalize_links(other, prefix),
                }
            }
        }
        other => globalize_links(other, prefix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::endpoint::Endpoint;
    use crate::http::response::ApiResponse;
    use crate::routing::registry::RegistryBuilder;
    use crate::store::{BoundValues, StoreError, StoreResult};

    const PREFIX: &str = "http://localhost:8000/api";

    fn list(_: &RequestContext<'_>) -> ApiResult {
        Ok(ApiResponse::ok(json!([
            { "code": "ATL", "links": { "self": "/airports/ATL" } },
            { "code": "BOS", "links": { "self": "/airports/BOS" } },
        ]))
        .with_link("next_page", "/airports?page=2&limit=2"))
    }

    fn item(request: &RequestContext<'_>) -> ApiResult {
        let code = request.path_arg("code")?;
        Ok(ApiResponse::ok(json!({ "code": code })).with_link("self", format!("/airports/{code}")))
    }

    fn broken(request: &RequestContext<'_>) -> ApiResult {
        request
            .store
            .with_session(|s| s.count("SELECT COUNT(*) FROM missing", &BoundValues::new()))?;
        Ok(ApiResponse::ok(json!(null)))
    }

    fn router(expose_backend_errors: bool) -> Router {
        let mut builder = RegistryBuilder::new();
        builder
            .register(Endpoint::at("/airports").unwrap().get(list))
            .register(Endpoint::at("/airports/{code}").unwrap().get(item))
            .register(Endpoint::at("/broken").unwrap().get(broken));
        Router::new(
            builder.build().unwrap(),
            Store::open_in_memory().unwrap(),
            RouterSettings {
                link_prefix: PREFIX.to_string(),
                expose_backend_errors,
            },
        )
    }

    fn get(router: &Router, uri: &str) -> Envelope {
        router.respond(&ApiRequest {
            verb: Verb::Get,
            uri,
            request_id: "test",
            args: &Args::new(),
            client_address: Some("127.0.0.1"),
        })
    }

    #[derive(Default)]
    struct RecordingLog(Mutex<Vec<(String, String, Verb)>>);

    impl RequestLog for RecordingLog {
        fn record(&self, client_address: &str, endpoint_uri: &str, verb: Verb) -> StoreResult<()> {
            self.0
                .lock()
                .unwrap()
                .push((client_address.into(), endpoint_uri.into(), verb));
            Ok(())
        }
    }

    struct FailingLog;

    impl RequestLog for FailingLog {
        fn record(&self, _: &str, _: &str, _: Verb) -> StoreResult<()> {
            Err(StoreError::Poisoned)
        }
    }

    #[test]
    fn test_links_globalized_at_every_depth() {
        let envelope = get(&router(true), "/airports?page=1&limit=2");

        assert_eq!(envelope.status, StatusCode::OK);
        let body = &envelope.body;
        assert_eq!(body["content"][0]["links"]["self"], format!("{PREFIX}/airports/ATL"));
        assert_eq!(body["content"][1]["links"]["self"], format!("{PREFIX}/airports/BOS"));
        assert_eq!(body["links"]["next_page"], format!("{PREFIX}/airports?page=2&limit=2"));
        assert_eq!(body["content"][0]["code"], "ATL");
        assert!(body["response_time"].is_f64());
    }

    #[test]
    fn test_self_link_injected_only_when_absent() {
        let router = router(true);

        let collection = get(&router, "/airports?page=1&limit=2");
        assert_eq!(collection.body["links"]["self"], format!("{PREFIX}/airports?page=1&limit=2"));

        let single = get(&router, "/airports/ATL?verbose=1");
        assert_eq!(single.body["links"]["self"], format!("{PREFIX}/airports/ATL"));
        assert_eq!(single.body["content"]["code"], "ATL");
    }

    #[test]
    fn test_unmatched_uri_lists_every_endpoint() {
        let envelope = get(&router(true), "/nowhere/at/all");

        assert_eq!(envelope.status, StatusCode::NOT_FOUND);
        let context = &envelope.body["content"]["context"];
        assert_eq!(
            context["available_resources"],
            json!([
                format!("{PREFIX}/airports"),
                format!("{PREFIX}/broken"),
                format!("{PREFIX}/airports/{{code}}"),
            ])
        );
        assert_eq!(envelope.body["content"]["error_message"], "Resource not found.");
        assert_eq!(envelope.body["links"]["self"], format!("{PREFIX}/nowhere/at/all"));
    }

    #[test]
    fn test_unsupported_verb_passes_through_as_bad_request() {
        let envelope = router(true).respond(&ApiRequest {
            verb: Verb::Delete,
            uri: "/airports",
            request_id: "test",
            args: &Args::new(),
            client_address: None,
        });
        assert_eq!(envelope.status, StatusCode::BAD_REQUEST);
        assert_eq!(envelope.body["content"]["context"]["attempted_method"], "DELETE");
    }

    #[test]
    fn test_store_failure_diagnostics_follow_setting() {
        let exposed = get(&router(true), "/broken");
        assert_eq!(exposed.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(exposed.body["content"]["context"]["db_error"]
            .as_str()
            .unwrap()
            .contains("missing"));

        let hidden = get(&router(false), "/broken");
        assert_eq!(hidden.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hidden.body["content"]["context"], json!({}));
    }

    #[test]
    fn test_request_log_sees_resolved_requests_only() {
        let log = Arc::new(RecordingLog::default());
        let router = router(true).with_request_log(log.clone());

        get(&router, "/airports/BOS");
        get(&router, "/unknown");

        let entries = log.0.lock().unwrap();
        assert_eq!(
            *entries,
            vec![("127.0.0.1".to_string(), "/airports/{code}".to_string(), Verb::Get)]
        );
    }

    #[test]
    fn test_failing_request_log_does_not_abort_response() {
        let router = router(true).with_request_log(Arc::new(FailingLog));
        assert_eq!(get(&router, "/airports").status, StatusCode::OK);
    }

    #[test]
    fn test_globalize_nested_link_maps() {
        let mut value = json!({
            "content": { "links": { "self": "/a", "related": { "links": { "up": "/b" } } } },
            "other": "/untouched",
        });
        globalize_links(&mut value, "http://h/api");
        assert_eq!(value["content"]["links"]["self"], "http://h/api/a");
        assert_eq!(value["content"]["links"]["related"]["links"]["up"], "http://h/api/b");
        assert_eq!(value["other"], "/untouched");
    }
}
