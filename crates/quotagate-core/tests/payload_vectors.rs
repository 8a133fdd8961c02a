//! Payload validation vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use quotagate_core::protocol::payload::{validate_payload, Validation};
use quotagate_core::RequiredKeySet;

mod vector_loader;
use vector_loader::{load, ExpectValidation, ValidationVector};

#[test]
fn validation_vectors() {
    let vectors: Vec<ValidationVector> = load("validation_cases.json");

    for v in vectors {
        let keys = RequiredKeySet::compile(&v.required_keys).unwrap();
        let res = validate_payload(v.body.as_bytes(), &keys);

        match (&v.expect, res) {
            (ExpectValidation::Malformed, Validation::Malformed(_)) => {}
            (ExpectValidation::Valid, Validation::Valid(_)) => {}
            (ExpectValidation::MissingKey { key }, Validation::MissingKey(found)) => {
                assert_eq!(found.as_str(), key, "vector={}", v.description);
            }
            (expected, got) => panic!(
                "vector={} expected {:?}, got {:?}",
                v.description, expected, got
            ),
        }
    }
}
