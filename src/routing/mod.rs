//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming API request (verb, path relative to the API root, args)
//!     → registry.rs (segment-count bucket, ranked template match)
//!     → template.rs (bind path parameters)
//!     → router.rs (verb dispatch, self link, link globalization)
//!     → Envelope {content, links, response_time}
//!
//! Registry construction (at startup):
//!     Endpoint[]
//!     → Sort by specificity (literal before parameter)
//!     → Reject templates with identical shapes
//!     → Freeze as immutable Registry
//! ```
//!
//! # Design Decisions
//! - Endpoints registered at startup, immutable at runtime
//! - No regex in the hot path (positional segment comparison)
//! - Deterministic: the same path always resolves to the same endpoint

pub mod registry;
pub mod router;
pub mod template;

pub use registry::{Registry, RegistryBuilder, RegistryError, RouteMatch};
pub use router::{globalize_links, ApiRequest, Envelope, Router, RouterSettings};
pub use template::{PathArgs, PathTemplate, TemplateError};
