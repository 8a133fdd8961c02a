//! Header-stage gate: content-type precondition.

use super::Rejection;

/// Exact value required; parameters such as `; charset=utf-8` do not match.
pub const REQUIRED_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Reject(Rejection),
}

pub fn check_content_type(value: Option<&str>) -> GateDecision {
    match value {
        Some(REQUIRED_CONTENT_TYPE) => GateDecision::Pass,
        _ => GateDecision::Reject(Rejection::CONTENT_TYPE),
    }
}
