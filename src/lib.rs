//! Airline statistics REST API.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum, middleware, API root)
//!                         │
//!                         ▼
//!                     routing::Router ──▶ routing::Registry (PathTemplate match)
//!                         │
//!                         ▼
//!                     endpoint::Endpoint (verb slot, mandatory keys)
//!                         │
//!                         ▼
//!                     resources::* ──▶ pagination (Paginator, ConditionBuilder)
//!                         │                │
//!                         ▼                ▼
//!                     store (SQLite, named parameters, transactions)
//!
//!     Client Response
//!     ◀────────────── envelope {content, links, response_time} as JSON or CSV
//! ```

// Core subsystems
pub mod config;
pub mod endpoint;
pub mod http;
pub mod pagination;
pub mod resources;
pub mod routing;
pub mod store;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ApiConfig;
pub use http::ApiServer;
pub use lifecycle::Shutdown;
pub use store::Store;
