//! Frozen endpoint registry.
//!
//! # Responsibilities
//! - Collect endpoints during startup
//! - Rank them by specificity and reject templates that can never be told apart
//! - Resolve a request path to one endpoint plus its bound path parameters
//!
//! # Design Decisions
//! - Immutable after `build()`; no runtime registration
//! - Ranking is explicit: literal segments beat parameter segments at the
//!   first position where two templates differ, so registration order never
//!   decides a match
//! - Candidates are bucketed by segment count, so only same-length templates
//!   are ever compared

use std::collections::HashMap;

use thiserror::Error;

use crate::endpoint::Endpoint;
use crate::routing::template::{split_segments, PathArgs, TemplateError};

/// Errors raised while building the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid endpoint template: {0}")]
    Template(#[from] TemplateError),

    #[error("templates '{first}' and '{second}' match exactly the same paths")]
    AmbiguousTemplate { first: String, second: String },
}

/// Result of a successful resolution.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub endpoint: &'a Endpoint,
    pub path_args: PathArgs,
}

/// Startup-time collector of endpoints.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    endpoints: Vec<Endpoint>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, endpoint: Endpoint) -> &mut Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Rank, validate and freeze the registered endpoints.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut endpoints = self.endpoints;
        endpoints.sort_by(|a, b| a.template().cmp_specificity(b.template()));

        for (i, first) in endpoints.iter().enumerate() {
            if let Some(second) = endpoints[i + 1..]
                .iter()
                .find(|other| first.template().same_shape(other.template()))
            {
                return Err(RegistryError::AmbiguousTemplate {
                    first: first.uri().to_string(),
                    second: second.uri().to_string(),
                });
            }
        }

        let mut by_len: HashMap<usize, Vec<usize>> = HashMap::new();
        for (index, endpoint) in endpoints.iter().enumerate() {
            by_len.entry(endpoint.template().len()).or_default().push(index);
        }

        tracing::debug!(endpoints = endpoints.len(), "Endpoint registry frozen");
        Ok(Registry { endpoints, by_len })
    }
}

/// Immutable, ranked set of endpoints.
#[derive(Debug)]
pub struct Registry {
    endpoints: Vec<Endpoint>,
    by_len: HashMap<usize, Vec<usize>>,
}

impl Registry {
    /// Resolve a request path (query string ignored) to its endpoint.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        let path = path.split('?').next().unwrap_or_default();
        let segments: Vec<&str> = split_segments(path).collect();

        self.by_len
            .get(&segments.len())?
            .iter()
            .map(|&index| &self.endpoints[index])
            .find_map(|endpoint| {
                endpoint
                    .template()
                    .matches(&segments)
                    .map(|path_args| RouteMatch { endpoint, path_args })
            })
    }

    /// Endpoints in resolution order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// Every endpoint URI template, in resolution order.
    pub fn uris(&self) -> Vec<&str> {
        self.endpoints.iter().map(Endpoint::uri).collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
