//! quotaGate gateway library entry.
//!
//! This crate holds the request filter (content-type gate, body accounting,
//! payload validation, policy dispatch, verdict handling) behind the `Host`
//! contract, plus a standalone axum host, config loading, and metrics. It is
//! consumed by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod filter;
pub mod host;
pub mod obs;
pub mod ops;
pub mod router;
pub mod transport;
