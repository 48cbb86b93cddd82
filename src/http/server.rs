//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: API root → API handler, everything else → static files
//! - Wire up middleware (body limit, timeout, request id, tracing)
//! - Translate HTTP requests into `ApiRequest`s and envelopes back into responses
//! - Serve until the shutdown broadcast fires
//!
//! # Design Decisions
//! - The API core is synchronous; each request runs on the blocking pool
//! - JSON by default, CSV when the client asks for `text/csv`
//! - 204 responses carry no body

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tracing::Span;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::endpoint::Verb;
use crate::http::csv;
use crate::http::request::{request_args, MakeRequestUuidV4, X_REQUEST_ID};
use crate::http::response::ApiError;
use crate::resources;
use crate::routing::{ApiRequest, Envelope, RegistryError, Router as ApiRouter, RouterSettings};
use crate::store::{SqliteRequestLog, Store};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ApiRouter>,
    /// Path prefix of the API, without a trailing slash.
    pub api_root: Arc<str>,
    pub max_body_size: usize,
}

/// HTTP server for the statistics API.
pub struct ApiServer {
    app: Router,
    api_root: String,
}

impl ApiServer {
    /// Build the endpoint registry and the HTTP stack around it.
    pub fn new(config: &ApiConfig, store: Store) -> Result<Self, RegistryError> {
        let registry = resources::build_registry(config.pagination)?;
        let settings = RouterSettings {
            link_prefix: config.api.link_prefix(),
            expose_backend_errors: config.api.expose_backend_errors,
        };

        let mut router = ApiRouter::new(registry, store.clone(), settings);
        if config.observability.request_log_enabled {
            router = router.with_request_log(Arc::new(SqliteRequestLog::new(store)));
        }
        tracing::info!(endpoints = router.registry().len(), "Endpoint registry built");

        let api_root = config.api.root.trim_end_matches('/').to_string();
        let state = AppState {
            router: Arc::new(router),
            api_root: Arc::from(api_root.as_str()),
            max_body_size: config.security.max_body_size,
        };

        let app = Self::build_router(config, state);
        Ok(Self { app, api_root })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ApiConfig, state: AppState) -> Router {
        let root = state.api_root.to_string();
        let mut app = if root.is_empty() {
            Router::new()
                .route("/", any(api_handler))
                .route("/{*path}", any(api_handler))
        } else {
            Router::new()
                .route(&root, any(api_handler))
                .route(&format!("{root}/"), any(api_handler))
                .route(&format!("{root}/{{*path}}"), any(api_handler))
        };

        app = match &config.api.static_dir {
            Some(dir) => app.fallback_service(ServeDir::new(dir)),
            None => app.fallback(not_found),
        };

        let request_id = HeaderName::from_static(X_REQUEST_ID);
        app.with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuidV4))
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
                .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
        )
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, api_root = %self.api_root, "HTTP server starting");

        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Path and query of `uri` relative to the API root.
fn relative_uri(api_root: &str, uri: &Uri) -> String {
    let path = uri.path().strip_prefix(api_root).unwrap_or(uri.path());
    let path = if path.is_empty() { "/" } else { path };
    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

/// The request id set by `SetRequestIdLayer`, or `unknown`.
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id(request.headers()),
    )
}

fn wants_csv(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/csv"))
}

/// Main API handler.
async fn api_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let started = Instant::now();
    let verb = Verb::from_method(request.method().as_str());
    let uri = relative_uri(&state.api_root, request.uri());
    let as_csv = wants_csv(request.headers());
    let request_id = request_id(request.headers());
    let client_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let query = request.uri().query().map(str::to_string);

    let body = match to_bytes(request.into_body(), state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = ApiError::bad_request("Request body could not be read.").with_context("reason", e.to_string());
            return render(state.router.finalize(Err(err), &uri, &request_id, started), as_csv);
        }
    };

    let args = match request_args(verb, query.as_deref(), content_type.as_deref(), &body) {
        Ok(args) => args,
        Err(err) => return render(state.router.finalize(Err(err), &uri, &request_id, started), as_csv),
    };

    let router = Arc::clone(&state.router);
    let task_uri = uri.clone();
    let task_request_id = request_id.clone();
    let envelope = tokio::task::spawn_blocking(move || {
        router.respond(&ApiRequest {
            verb,
            uri: &task_uri,
            request_id: &task_request_id,
            args: &args,
            client_address: client_address.as_deref(),
        })
    })
    .await;

    let envelope = envelope.unwrap_or_else(|e| {
        tracing::error!(request_id = %request_id, uri = %uri, error = %e, "Request task failed");
        state
            .router
            .finalize(Err(ApiError::internal("Request handler failed.")), &uri, &request_id, started)
    });
    render(envelope, as_csv)
}

fn render(envelope: Envelope, as_csv: bool) -> Response {
    if envelope.status == StatusCode::NO_CONTENT {
        return StatusCode::NO_CONTENT.into_response();
    }
    if as_csv {
        return (
            envelope.status,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            csv::render(&envelope.body),
        )
            .into_response();
    }
    (envelope.status, Json(envelope.body)).into_response()
}

/// Fallback for paths outside the API root when no static directory is set.
async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "content": {
                "error_message": "Not found.",
                "context": { "path": uri.path() },
            },
            "links": {},
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema;
    use tower::ServiceExt;

    fn app() -> Router {
        let store = Store::open_in_memory().unwrap();
        schema::bootstrap(&store).unwrap();
        let config = ApiConfig::default();
        ApiServer::new(&config, store).unwrap().app
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_api_root_is_routed_to_the_registry() {
        let response = app()
            .oneshot(Request::get("/api/carriers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));

        let body = body_json(response).await;
        assert_eq!(body["content"], json!([]));
        assert_eq!(body["links"]["self"], "http://localhost:8000/api/carriers?page=1&limit=10");
    }

    #[tokio::test]
    async fn test_api_root_itself_lists_resources() {
        let response = app()
            .oneshot(Request::get("/api").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["content"]["context"]["requested_uri"], "/");
    }

    #[tokio::test]
    async fn test_outside_api_root_without_static_dir() {
        let response = app()
            .oneshot(Request::get("/favicon.ico").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["content"]["context"]["path"], "/favicon.ico");
    }

    #[test]
    fn test_relative_uri_strips_root_and_keeps_query() {
        let uri: Uri = "/api/statistics?year=2004".parse().unwrap();
        assert_eq!(relative_uri("/api", &uri), "/statistics?year=2004");

        let uri: Uri = "/api".parse().unwrap();
        assert_eq!(relative_uri("/api", &uri), "/");

        let uri: Uri = "/airports".parse().unwrap();
        assert_eq!(relative_uri("", &uri), "/airports");
    }

    #[tokio::test]
    async fn test_static_dir_serves_files_outside_api_root() {
        let dir = std::env::temp_dir().join(format!("flight-stats-static-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("file.txt"), "hello from disk").unwrap();

        let store = Store::open_in_memory().unwrap();
        schema::bootstrap(&store).unwrap();
        let mut config = ApiConfig::default();
        config.api.static_dir = Some(dir.to_string_lossy().into_owned());
        let app = ApiServer::new(&config, store).unwrap().app;

        let response = app
            .clone()
            .oneshot(Request::get("/file.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hello from disk");

        let response = app
            .oneshot(Request::get("/api/airports").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["links"]["self"], "http://localhost:8000/api/airports?page=1&limit=10");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_request_id_read_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), "unknown");
        headers.insert(X_REQUEST_ID, "abc-123".parse().unwrap());
        assert_eq!(request_id(&headers), "abc-123");
    }

    #[tokio::test]
    async fn test_incoming_request_id_is_kept() {
        let response = app()
            .oneshot(
                Request::get("/api/airports")
                    .header(X_REQUEST_ID, "client-supplied")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[X_REQUEST_ID], "client-supplied");
    }

    #[test]
    fn test_csv_negotiation() {
        let mut headers = HeaderMap::new();
        assert!(!wants_csv(&headers));
        headers.insert(header::ACCEPT, "text/csv".parse().unwrap());
        assert!(wants_csv(&headers));
    }

    #[test]
    fn test_no_content_has_empty_body() {
        let envelope = Envelope {
            status: StatusCode::NO_CONTENT,
            body: json!({ "content": { "message": "Resource deleted." } }),
        };
        let response = render(envelope, false);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }
}
