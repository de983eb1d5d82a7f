//! Payload normalization.
//!
//! Producers send one of three shapes:
//!
//! 1. `{"well_data": [...]}`: a summary envelope
//! 2. `[...]`: a bare batch
//! 3. `{...}`: a single reading
//!
//! Whatever the shape, the result is a flat list of [`Record`]s in the order
//! they were sent. A batch nested inside a batch is spliced in place (one level).

use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::Record;

const ENVELOPE_KEY: &str = "well_data";

/// Decodes a complete payload. Nothing is returned on failure, so callers
/// never commit part of a bad batch.
pub fn decode(payload: &[u8]) -> Result<Vec<Record>> {
    let document: Value =
        serde_json::from_slice(payload).map_err(|e| Error::MalformedPayload(e.to_string()))?;

    candidates(document)
        .into_iter()
        .enumerate()
        .map(|(i, value)| into_record(value).map_err(|e| Error::MalformedPayload(format!("record {}: {}", i, e))))
        .collect()
}

/// Resolves the top-level shape and flattens one level of nesting.
fn candidates(document: Value) -> Vec<Value> {
    let elements = match document {
        Value::Object(mut obj) if matches!(obj.get(ENVELOPE_KEY), Some(Value::Array(_))) => {
            match obj.remove(ENVELOPE_KEY) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }
        }
        Value::Array(items) => items,
        other => vec![other],
    };
    flatten_one_level(elements)
}

/// Splices nested arrays into their parent. Used on ingest and again when
/// reading history, where older files may hold whole batches as single entries.
pub fn flatten_one_level(elements: Vec<Value>) -> Vec<Value> {
    let mut flat = Vec::with_capacity(elements.len());
    for element in elements {
        match element {
            Value::Array(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    flat
}

pub(crate) fn into_record(value: Value) -> std::result::Result<Record, String> {
    match value {
        Value::Object(_) => serde_json::from_value(value).map_err(|e| e.to_string()),
        Value::Null => Err("expected an object, found null".into()),
        Value::Bool(_) => Err("expected an object, found a boolean".into()),
        Value::Number(_) => Err("expected an object, found a number".into()),
        Value::String(_) => Err("expected an object, found a string".into()),
        Value::Array(_) => Err("expected an object, found an array nested too deeply".into()),
    }
}
