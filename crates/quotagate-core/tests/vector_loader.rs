//! JSON test vector loader shared by payload/summary tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SummaryVector {
    pub description: String,
    pub payload: serde_json::Value,
    /// Expected statistics; names not listed must be absent.
    pub expect: BTreeMap<String, Vec<usize>>,
}

#[derive(Debug, Deserialize)]
pub struct ValidationVector {
    pub description: String,
    pub required_keys: Vec<String>,
    /// Raw body as it would arrive on the wire.
    pub body: String,
    pub expect: ExpectValidation,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpectValidation {
    Malformed,
    MissingKey { key: String },
    Valid,
}

pub fn load<T: serde::de::DeserializeOwned>(name: &str) -> T {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}
