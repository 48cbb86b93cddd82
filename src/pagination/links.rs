//! Structured relative URIs for page navigation.

use std::fmt;

use url::form_urlencoded;

use crate::http::response::Links;

/// A relative URI whose query string is kept as ordered key/value pairs and
/// serialized once on output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkUri {
    path: String,
    query: Vec<(String, String)>,
}

impl LinkUri {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    /// Split a raw request URI into its path and decoded query pairs.
    pub fn parse(raw: &str) -> Self {
        let (path, query) = raw.split_once('?').unwrap_or((raw, ""));
        Self {
            path: path.to_string(),
            query: form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key`, replacing the first occurrence in place and dropping any
    /// repeats, or appending it when absent.
    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        match self.query.iter().position(|(k, _)| k == key) {
            Some(first) => {
                self.query[first].1 = value;
                let mut index = 0;
                self.query.retain(|(k, _)| {
                    let keep = index <= first || k != key;
                    index += 1;
                    keep
                });
            }
            None => self.query.push((key.to_string(), value)),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }
}

impl fmt::Display for LinkUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        if !self.query.is_empty() {
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&self.query)
                .finish();
            write!(f, "?{encoded}")?;
        }
        Ok(())
    }
}

/// Navigation links for one page of a collection.
///
/// `self` always carries `page` and `limit`. `last_page` points at page 1
/// for an empty collection.
pub fn page_links(raw_uri: &str, page: i64, limit: i64, page_count: i64) -> Links {
    let current = LinkUri::parse(raw_uri).with("page", page).with("limit", limit);
    let at = |target: i64| current.clone().with("page", target).to_string();

    let mut links = Links::new();
    links.insert("self".into(), current.to_string());
    links.insert("first_page".into(), at(1));
    links.insert("last_page".into(), at(page_count.max(1)));
    if page > 1 {
        links.insert("previous_page".into(), at(page - 1));
    }
    if page < page_count {
        links.insert("next_page".into(), at(page + 1));
    }
    links
}
