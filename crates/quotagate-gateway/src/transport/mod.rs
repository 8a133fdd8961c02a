//! Standalone host (HTTP).
//!
//! Runs the filter without a proxy: `session` implements the host contract
//! for one axum request and drives its lifecycle events; `outbound` performs
//! policy calls against named clusters and forwards admitted requests.

pub mod outbound;
pub mod session;
