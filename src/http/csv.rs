//! CSV rendering of a response envelope.
//!
//! Output is a header row and one row per `content` record, with nested
//! keys flattened and joined by `_`, then (when present) a row of link
//! names and a row of link targets.

use std::borrow::Cow;

use serde_json::{Map, Value};

/// Render an envelope body `{content, links, ...}` as CSV text.
pub fn render(body: &Value) -> String {
    let records: Vec<Map<String, Value>> = match body.get("content") {
        Some(Value::Array(items)) => items.iter().map(flatten).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![flatten(other)],
    };

    let mut out = String::new();
    if let Some(first) = records.first() {
        let header: Vec<&String> = first.keys().collect();
        write_row(&mut out, header.iter().map(|key| Cow::from(key.as_str())));
        for record in &records {
            write_row(&mut out, header.iter().map(|key| cell(record.get(*key))));
        }
    }

    if let Some(Value::Object(links)) = body.get("links") {
        if !links.is_empty() {
            write_row(&mut out, links.keys().map(|key| Cow::from(key.as_str())));
            write_row(&mut out, links.values().map(|value| cell(Some(value))));
        }
    }
    out
}

/// One-level map of `value`; nested keys are joined with `_`.
fn flatten(value: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    match value {
        Value::Object(_) | Value::Array(_) => flatten_into(&mut out, "", value),
        scalar => {
            out.insert("content".to_string(), scalar.clone());
        }
    }
    out
}

fn flatten_into(out: &mut Map<String, Value>, prefix: &str, value: &Value) {
    let children: Vec<(String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
        _ => return,
    };
    for (key, child) in children {
        let key = format!("{prefix}{key}");
        match child {
            Value::Object(_) | Value::Array(_) => flatten_into(out, &format!("{key}_"), child),
            scalar => {
                out.insert(key, scalar.clone());
            }
        }
    }
}

fn cell(value: Option<&Value>) -> Cow<'_, str> {
    match value {
        None | Some(Value::Null) => Cow::Borrowed(""),
        Some(Value::String(s)) => Cow::Borrowed(s),
        Some(other) => Cow::Owned(other.to_string()),
    }
}

fn write_row<'a>(out: &mut String, fields: impl Iterator<Item = Cow<'a, str>>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(&field);
        }
    }
    out.push_str("\r\n");
}
