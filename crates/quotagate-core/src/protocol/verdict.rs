//! Policy reply parsing.
//!
//! The policy service answers with `{"result": {"allow": <bool>}}`. Only a
//! JSON `true` at that path allows; every other shape (missing field, string,
//! number, invalid JSON) is a denial.

use serde_json::Value;

/// Path of the verdict inside the reply, as a JSON pointer.
pub const VERDICT_POINTER: &str = "/result/allow";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVerdict {
    Allow,
    Deny,
}

impl PolicyVerdict {
    pub fn from_reply(body: &[u8]) -> Self {
        let reply: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "policy reply is not json; treating as deny");
                return PolicyVerdict::Deny;
            }
        };

        match reply.pointer(VERDICT_POINTER) {
            Some(Value::Bool(true)) => PolicyVerdict::Allow,
            Some(Value::Bool(false)) => PolicyVerdict::Deny,
            other => {
                tracing::debug!(
                    found = ?other,
                    "policy reply has no boolean result.allow; treating as deny"
                );
                PolicyVerdict::Deny
            }
        }
    }

    pub fn is_allow(self) -> bool {
        matches!(self, PolicyVerdict::Allow)
    }
}
