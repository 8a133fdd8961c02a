//! Verdict handling once the policy call completes.
//!
//! ```text
//! Pending ──reply──> Allowed ───────────> Resumed
//!    │          └──> Denied ────────────> Rejected (429)
//!    └─no reply──> CallFailed ─┬─reject─> Rejected (503)
//!                              └─allow──> PassedThrough (resumed)
//! ```
//!
//! Every branch ends in exactly one terminal host action.

use bytes::Bytes;

use quotagate_core::error::QuotaGateError;
use quotagate_core::protocol::verdict::PolicyVerdict;

use crate::config::FailureMode;

use super::Rejection;

/// What the completion callback observed.
#[derive(Debug)]
pub enum CallOutcome {
    Reply(Bytes),
    Failed(QuotaGateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Allowed: resume the suspended request.
    Resume,
    /// No verdict, configured to let it through: resume anyway.
    PassThrough,
    /// Denied, or no verdict while failing closed.
    Reject(Rejection),
}

impl Decision {
    pub fn outcome_label(self) -> &'static str {
        match self {
            Decision::Resume => "resumed",
            Decision::PassThrough => "passed_through",
            Decision::Reject(_) => "rejected",
        }
    }
}

pub fn decide(outcome: &CallOutcome, on_unavailable: FailureMode) -> Decision {
    match outcome {
        CallOutcome::Reply(body) => match PolicyVerdict::from_reply(body) {
            PolicyVerdict::Allow => Decision::Resume,
            PolicyVerdict::Deny => Decision::Reject(Rejection::QUOTA_EXCEEDED),
        },
        CallOutcome::Failed(_) => match on_unavailable {
            FailureMode::Allow => Decision::PassThrough,
            FailureMode::Reject => Decision::Reject(Rejection::POLICY_UNAVAILABLE),
        },
    }
}
