//! quotaGate core: transport-agnostic payload primitives, error types, and
//! the policy wire contract.
//!
//! This crate owns everything that can be decided from bytes alone: required
//! key paths, payload validation, payload summarization, and verdict parsing.
//! It carries no runtime or host dependencies so the same rules apply in the
//! standalone gateway, in tests, and in any other host embedding the filter.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Hostile request bodies must surface as a `Validation` or a
//! `QuotaGateError`, never as a crashed worker.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod keys;
pub mod protocol;

/// Shared result type.
pub use error::{QuotaGateError, RejectCode, Result};
pub use keys::{KeyPath, RequiredKeySet};
