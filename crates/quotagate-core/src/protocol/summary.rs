//! Payload summarization.
//!
//! Statistics are keyed by name and only exist when the payload carried the
//! corresponding top-level field: a missing key means "no data", which is
//! not the same thing as an empty list.
//!
//! Iteration rules for a top-level field:
//! - array: its elements
//! - object: its values (member names only matter for `metadatas` entries)
//! - any other non-null scalar: a single element

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::error::{QuotaGateError, Result};

pub const METADATA_KEY_LENGTHS: &str = "metadata_key_lengths";
pub const METADATA_VALUE_LENGTHS: &str = "metadata_value_lengths";
pub const DOCUMENT_LENGTHS: &str = "document_lengths";
pub const EMBEDDINGS_DIMENSIONS: &str = "embeddings_dimensions";

/// Statistic name -> ordered values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PayloadSummary {
    stats: BTreeMap<&'static str, Vec<usize>>,
}

/// Wire envelope: `{"input": {...}}`.
#[derive(Debug, Serialize)]
struct SummaryEnvelope<'a> {
    input: &'a PayloadSummary,
}

impl PayloadSummary {
    /// Summarize a parsed payload. Pure: same document, same summary.
    pub fn from_document(doc: &Value) -> Self {
        let mut out = Self::default();

        if let Some(metadatas) = field(doc, "metadatas") {
            for (_, entry) in entries(metadatas) {
                for (key, value) in entries(entry) {
                    if let Some(key) = key {
                        out.push(METADATA_KEY_LENGTHS, char_len(key));
                    }
                    if let Value::String(s) = value {
                        out.push(METADATA_VALUE_LENGTHS, char_len(s));
                    }
                }
            }
        }

        if let Some(documents) = field(doc, "documents") {
            for (_, value) in entries(documents) {
                out.push(DOCUMENT_LENGTHS, rendered_len(value));
            }
        }

        if let Some(embeddings) = field(doc, "embeddings") {
            for (_, value) in entries(embeddings) {
                let dims = match value {
                    Value::Array(items) => items.len(),
                    Value::Null => 0,
                    _ => 1,
                };
                out.push(EMBEDDINGS_DIMENSIONS, dims);
            }
        }

        out
    }

    pub fn get(&self, name: &str) -> Option<&[usize]> {
        self.stats.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stats.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Serialize as the policy request body.
    pub fn to_envelope_bytes(&self) -> Result<Bytes> {
        serde_json::to_vec(&SummaryEnvelope { input: self })
            .map(Bytes::from)
            .map_err(|e| QuotaGateError::Internal(format!("summary marshal failed: {e}")))
    }

    fn push(&mut self, name: &'static str, v: usize) {
        self.stats.entry(name).or_default().push(v);
    }
}

fn field<'a>(doc: &'a Value, name: &str) -> Option<&'a Value> {
    doc.get(name).filter(|v| !v.is_null())
}

/// (member name, value) pairs; names only for objects.
fn entries(v: &Value) -> Vec<(Option<&str>, &Value)> {
    match v {
        Value::Object(map) => map.iter().map(|(k, v)| (Some(k.as_str()), v)).collect(),
        Value::Array(items) => items.iter().map(|v| (None, v)).collect(),
        Value::Null => Vec::new(),
        scalar => vec![(None, scalar)],
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn rendered_len(v: &Value) -> usize {
    match v {
        Value::String(s) => char_len(s),
        Value::Null => 0,
        other => char_len(&other.to_string()),
    }
}
