//! Collection windowing subsystem.
//!
//! # Data Flow
//! ```text
//! Collection endpoint (GET)
//!     → paginator.rs (page/limit, offset, page count)
//!     → condition.rs (filters shared by COUNT and SELECT)
//!     → links.rs (self / first / last / previous / next)
//! ```
//!
//! # Design Decisions
//! - Filters are bound values, never spliced into SQL text
//! - Page links are built from structured query maps and serialized once
//! - An out-of-range page yields an empty page, not an error

pub mod condition;
pub mod links;
pub mod paginator;

pub use condition::{ConditionBuilder, Conjunct};
pub use links::{page_links, LinkUri};
pub use paginator::{Collection, PageRequest, PaginationState, Paginator};

/// Page served when the client names none.
pub const DEFAULT_PAGE: u32 = 1;

/// Page size when the client names none.
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest page size a client may request.
pub const MAX_LIMIT: u32 = 50;
