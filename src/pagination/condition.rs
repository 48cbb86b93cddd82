//! Composable WHERE predicates with bound values.

use serde_json::Value;

use crate::endpoint::Args;
use crate::store::BoundValues;

/// One AND-joined predicate fragment and the values its placeholders name.
///
/// Value keys are bare names; the `:` marker is added by
/// [`ConditionBuilder::build_bound_values`].
#[derive(Debug, Clone, PartialEq)]
pub struct Conjunct {
    fragment: String,
    values: Vec<(String, Value)>,
}

impl Conjunct {
    pub fn new<K, I>(fragment: impl Into<String>, values: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self {
            fragment: fragment.into(),
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }
}

/// Ordered list of conjuncts for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionBuilder {
    conjuncts: Vec<Conjunct>,
}

impl ConditionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unconditionally.
    pub fn add_conjunct(&mut self, conjunct: Conjunct) -> &mut Self {
        self.conjuncts.push(conjunct);
        self
    }

    /// Append `fragment` only when every key in `keys` is present in `args`,
    /// binding each under its own name. Returns whether it was added.
    pub fn add_conjunct_if_keys_exist(&mut self, fragment: &str, keys: &[&str], args: &Args) -> bool {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            match args.get(*key) {
                Some(value) => values.push((key.to_string(), value.clone())),
                None => return false,
            }
        }
        self.conjuncts.push(Conjunct::new(fragment, values));
        true
    }

    pub fn has_conjuncts(&self) -> bool {
        !self.conjuncts.is_empty()
    }

    /// Fragments joined with `AND`; empty when there are no conjuncts.
    pub fn build_predicate(&self) -> String {
        self.conjuncts
            .iter()
            .map(Conjunct::fragment)
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Every conjunct's values keyed by `:name`.
    pub fn build_bound_values(&self) -> BoundValues {
        self.conjuncts
            .iter()
            .flat_map(Conjunct::values)
            .map(|(key, value)| (format!(":{key}"), value.clone()))
            .collect()
    }

    /// ` WHERE <predicate>`, or an empty string when unfiltered.
    pub fn where_clause(&self) -> String {
        if self.has_conjuncts() {
            format!(" WHERE {}", self.build_predicate())
        } else {
            String::new()
        }
    }
}
