//! Outbound authorization call.

use std::time::Duration;

use quotagate_core::error::Result;
use quotagate_core::protocol::summary::PayloadSummary;

use crate::config::PolicyCallConfig;
use crate::host::{CallToken, Host, OutboundCall, RequestId};

/// Call template compiled from config; one call per admitted request.
#[derive(Debug, Clone)]
pub struct PolicyClient {
    upstream: String,
    path: String,
    authority: String,
    timeout: Duration,
}

impl PolicyClient {
    pub fn new(cfg: &PolicyCallConfig) -> Self {
        Self {
            upstream: cfg.upstream.clone(),
            path: cfg.path.clone(),
            authority: cfg.authority().to_string(),
            timeout: Duration::from_millis(cfg.timeout_ms),
        }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Build the call carrying `{"input": summary}`.
    pub fn build_call(&self, summary: &PayloadSummary) -> Result<OutboundCall> {
        let body = summary.to_envelope_bytes()?;
        let headers = [
            (":method", "POST"),
            (":authority", self.authority.as_str()),
            ("accept", "*/*"),
            (":path", self.path.as_str()),
            ("content-type", "application/json"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Ok(OutboundCall {
            upstream: self.upstream.clone(),
            headers,
            body,
            timeout: self.timeout,
        })
    }

    pub fn dispatch(
        &self,
        host: &mut dyn Host,
        id: RequestId,
        call: OutboundCall,
    ) -> Result<CallToken> {
        host.dispatch_call(id, call)
    }
}
