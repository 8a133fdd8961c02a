//! Required key paths.
//!
//! A key path is a dot-separated list of segments (`a.b.0.c`). Each segment
//! selects an object member by name, or an array element when the current
//! value is an array and the segment is a decimal index. `\.` escapes a
//! literal dot inside a member name.

use serde_json::Value;

use crate::error::{QuotaGateError, Result};

/// One compiled key path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    raw: String,
    segments: Vec<String>,
}

impl KeyPath {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(QuotaGateError::BadConfig("required key must not be empty".into()));
        }

        let mut segments = Vec::new();
        let mut cur = String::new();
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(next) => cur.push(next),
                    None => cur.push('\\'),
                },
                '.' => segments.push(std::mem::take(&mut cur)),
                other => cur.push(other),
            }
        }
        segments.push(cur);

        if segments.iter().any(String::is_empty) {
            return Err(QuotaGateError::BadConfig(format!(
                "required key has an empty path segment: {raw}"
            )));
        }

        Ok(Self { raw: raw.to_string(), segments })
    }

    /// Path as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Resolve the path inside `doc`.
    pub fn lookup<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.segments.iter().try_fold(doc, |cur, seg| match cur {
            Value::Object(map) => map.get(seg),
            Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Existence check; a present `null` or empty value still counts.
    pub fn exists_in(&self, doc: &Value) -> bool {
        self.lookup(doc).is_some()
    }
}

impl std::fmt::Display for KeyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Ordered, immutable set of key paths every payload must contain.
/// Built once at startup, then shared read-only.
#[derive(Debug, Clone, Default)]
pub struct RequiredKeySet {
    keys: Vec<KeyPath>,
}

impl RequiredKeySet {
    pub fn compile(raw: &[String]) -> Result<Self> {
        let keys = raw
            .iter()
            .map(|k| KeyPath::parse(k))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// First key (in configured order) that `doc` does not contain.
    /// Stops at the first miss.
    pub fn first_missing(&self, doc: &Value) -> Option<&KeyPath> {
        self.keys.iter().find(|k| !k.exists_in(doc))
    }
}
