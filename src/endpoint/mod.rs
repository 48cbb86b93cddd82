//! Endpoint contract.
//!
//! # Responsibilities
//! - Map HTTP method strings to a closed `Verb` set
//! - Hold one optional handler slot per supported verb
//! - Reject unsupported verbs and missing mandatory keys before a handler runs
//!
//! # Design Decisions
//! - Capabilities are data (handler slots), not runtime type inspection
//! - Dispatch matches `Verb` exhaustively; PUT and unknown methods never have a slot
//! - Endpoints are immutable once built and owned by the registry

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::http::response::{ApiError, ApiResult};
use crate::routing::template::{PathArgs, PathTemplate, TemplateError};
use crate::store::Store;

/// Request arguments: query parameters, merged with body fields for writes.
pub type Args = serde_json::Map<String, Value>;

/// HTTP verbs the API distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Any method the API does not recognize.
    None,
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Verb {
    /// Map a method string (case-insensitive) to a verb.
    pub fn from_method(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Verb::Get,
            "POST" => Verb::Post,
            "PATCH" => Verb::Patch,
            "PUT" => Verb::Put,
            "DELETE" => Verb::Delete,
            _ => Verb::None,
        }
    }

    /// Stable integer code stored in the request log.
    pub fn code(self) -> i64 {
        match self {
            Verb::None => 0,
            Verb::Get => 1,
            Verb::Post => 2,
            Verb::Patch => 3,
            Verb::Put => 4,
            Verb::Delete => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::None => "NONE",
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Patch => "PATCH",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a handler may look at for one request.
pub struct RequestContext<'a> {
    /// Request URI relative to the API root, query string included.
    pub raw_uri: &'a str,
    pub path_args: &'a PathArgs,
    pub args: &'a Args,
    pub store: &'a Store,
}

impl RequestContext<'_> {
    /// The path portion of the request URI.
    pub fn path(&self) -> &str {
        self.raw_uri.split('?').next().unwrap_or_default()
    }

    /// A path parameter declared by the endpoint's template.
    pub fn path_arg(&self, name: &str) -> Result<&str, ApiError> {
        self.path_args.get(name).ok_or_else(|| {
            ApiError::internal(format!("Endpoint template has no parameter '{name}'."))
        })
    }
}

/// A verb handler.
pub trait Handler: Send + Sync {
    fn handle(&self, request: &RequestContext<'_>) -> ApiResult;
}

impl<F> Handler for F
where
    F: Fn(&RequestContext<'_>) -> ApiResult + Send + Sync,
{
    fn handle(&self, request: &RequestContext<'_>) -> ApiResult {
        self(request)
    }
}

struct Slot {
    handler: Arc<dyn Handler>,
    required_keys: Vec<&'static str>,
}

impl Slot {
    fn new(handler: impl Handler + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            required_keys: Vec::new(),
        }
    }
}

/// A unit addressable at a path template, with one handler slot per verb.
pub struct Endpoint {
    template: PathTemplate,
    get: Option<Slot>,
    post: Option<Slot>,
    patch: Option<Slot>,
    delete: Option<Slot>,
}

impl Endpoint {
    /// Create an endpoint with no capabilities at the given URI template.
    pub fn at(uri: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            template: PathTemplate::parse(uri)?,
            get: None,
            post: None,
            patch: None,
            delete: None,
        })
    }

    pub fn get(mut self, handler: impl Handler + 'static) -> Self {
        self.get = Some(Slot::new(handler));
        self
    }

    pub fn post(mut self, handler: impl Handler + 'static) -> Self {
        self.post = Some(Slot::new(handler));
        self
    }

    pub fn patch(mut self, handler: impl Handler + 'static) -> Self {
        self.patch = Some(Slot::new(handler));
        self
    }

    pub fn delete(mut self, handler: impl Handler + 'static) -> Self {
        self.delete = Some(Slot::new(handler));
        self
    }

    /// Declare keys that must be present before the `verb` handler runs.
    /// Has no effect for a verb without a handler.
    pub fn requires(mut self, verb: Verb, keys: &[&'static str]) -> Self {
        if let Some(slot) = self.slot_mut(verb) {
            slot.required_keys.extend_from_slice(keys);
        }
        self
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// The endpoint's URI template, normalized.
    pub fn uri(&self) -> &str {
        self.template.as_str()
    }

    /// Verbs this endpoint answers, in a fixed order.
    pub fn capabilities(&self) -> Vec<Verb> {
        [Verb::Get, Verb::Post, Verb::Patch, Verb::Delete]
            .into_iter()
            .filter(|verb| self.slot(*verb).is_some())
            .collect()
    }

    pub fn supports(&self, verb: Verb) -> bool {
        self.slot(verb).is_some()
    }

    fn slot(&self, verb: Verb) -> Option<&Slot> {
        match verb {
            Verb::Get => self.get.as_ref(),
            Verb::Post => self.post.as_ref(),
            Verb::Patch => self.patch.as_ref(),
            Verb::Delete => self.delete.as_ref(),
            Verb::Put | Verb::None => None,
        }
    }

    fn slot_mut(&mut self, verb: Verb) -> Option<&mut Slot> {
        match verb {
            Verb::Get => self.get.as_mut(),
            Verb::Post => self.post.as_mut(),
            Verb::Patch => self.patch.as_mut(),
            Verb::Delete => self.delete.as_mut(),
            Verb::Put | Verb::None => None,
        }
    }

    /// Run the handler for `verb`, after capability and mandatory-key checks.
    pub fn dispatch(&self, verb: Verb, request: &RequestContext<'_>) -> ApiResult {
        let Some(slot) = self.slot(verb) else {
            let supported: Vec<&str> = self.capabilities().into_iter().map(Verb::as_str).collect();
            return Err(ApiError::bad_request("Unsupported request method.")
                .with_context("attempted_method", verb.as_str())
                .with_context("supported_methods", json!(supported)));
        };

        if let Some(missing) = slot
            .required_keys
            .iter()
            .find(|key| request.args.get(**key).map_or(true, Value::is_null))
        {
            return Err(ApiError::bad_request(format!(
                "Missing mandatory parameter '{missing}'."
            ))
            .with_context("missing_parameter", *missing)
            .with_context("required_parameters", json!(slot.required_keys)));
        }

        slot.handler.handle(request)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("uri", &self.uri())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
