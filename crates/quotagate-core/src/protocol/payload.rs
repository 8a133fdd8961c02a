//! Request body validation.

use serde_json::Value;

use crate::keys::{KeyPath, RequiredKeySet};

/// Result of validating an accumulated request body.
#[derive(Debug)]
pub enum Validation<'k> {
    /// Body is not well-formed JSON (an empty body lands here too).
    Malformed(serde_json::Error),
    /// First required key absent from the document.
    MissingKey(&'k KeyPath),
    /// Every required key is present.
    Valid(Value),
}

/// Parse `body` and check every key of `keys` in order.
pub fn validate_payload<'k>(body: &[u8], keys: &'k RequiredKeySet) -> Validation<'k> {
    let doc: Value = match serde_json::from_slice(body) {
        Ok(doc) => doc,
        Err(e) => return Validation::Malformed(e),
    };

    match keys.first_missing(&doc) {
        Some(key) => Validation::MissingKey(key),
        None => Validation::Valid(doc),
    }
}
