//! Axum router wiring.
//!
//! Ops endpoints live under `/_gateway`; everything else is intercepted.

use axum::{routing::get, Router};

use crate::{app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/_gateway/healthz", get(ops::healthz))
        .route("/_gateway/readyz", get(ops::readyz))
        .route("/_gateway/metrics", get(ops::metrics))
        .fallback(transport::session::intercept)
        .with_state(state)
}
