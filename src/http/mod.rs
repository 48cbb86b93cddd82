//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, API root split)
//!     → request.rs (request ID, query/body arguments)
//!     → routing::Router (resolve, dispatch, finalize)
//!     → response.rs (status, payload, links, error taxonomy)
//!     → JSON or csv.rs → client
//! ```

pub mod csv;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use response::{ApiError, ApiResponse, ApiResult, ErrorKind, Links};
pub use server::{ApiServer, AppState};
