//! Plugin configuration (JSON blob read once at plugin start).
//!
//! ```json
//! { "requiredKeys": ["ids", "documents"] }
//! ```
//!
//! An absent or empty blob is valid and requires no keys. Every other field
//! is optional and defaults to the stock policy call.

use serde::Deserialize;

use quotagate_core::error::{QuotaGateError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PluginConfig {
    /// Key paths every JSON payload must contain, checked in order.
    #[serde(default)]
    pub required_keys: Vec<String>,

    /// Reject bodies larger than this many bytes (no limit when absent).
    #[serde(default)]
    pub max_body_bytes: Option<usize>,

    #[serde(default)]
    pub policy: PolicyCallConfig,

    #[serde(default)]
    pub failure_mode: FailureModeConfig,
}

impl PluginConfig {
    /// Parse the raw blob handed over by the host.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let cfg: PluginConfig = serde_json::from_slice(data).map_err(|e| {
            QuotaGateError::BadConfig(format!("plugin configuration is not valid json: {e}"))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_body_bytes == Some(0) {
            return Err(QuotaGateError::BadConfig(
                "maxBodyBytes must be greater than 0".into(),
            ));
        }
        self.policy.validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PolicyCallConfig {
    /// Named endpoint (cluster) the host resolves.
    #[serde(default = "default_upstream")]
    pub upstream: String,

    #[serde(default = "default_path")]
    pub path: String,

    /// `:authority` of the call; the upstream name when absent.
    #[serde(default)]
    pub authority: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PolicyCallConfig {
    fn default() -> Self {
        Self {
            upstream: default_upstream(),
            path: default_path(),
            authority: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl PolicyCallConfig {
    pub fn validate(&self) -> Result<()> {
        if self.upstream.is_empty() {
            return Err(QuotaGateError::BadConfig("policy.upstream must not be empty".into()));
        }
        if !self.path.starts_with('/') {
            return Err(QuotaGateError::BadConfig(format!(
                "policy.path must start with '/': {}",
                self.path
            )));
        }
        if !(1..=60000).contains(&self.timeout_ms) {
            return Err(QuotaGateError::BadConfig(
                "policy.timeoutMs must be between 1 and 60000".into(),
            ));
        }
        Ok(())
    }

    pub fn authority(&self) -> &str {
        self.authority.as_deref().unwrap_or(&self.upstream)
    }
}

fn default_upstream() -> String {
    "opa_service".into()
}
fn default_path() -> String {
    "/v1/data/chroma_quotas/validate".into()
}
fn default_timeout_ms() -> u64 {
    2000
}

/// What to do when a request cannot be judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Terminate the request with an error response.
    #[default]
    Reject,
    /// Let the request through unchanged.
    Allow,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FailureModeConfig {
    /// Body is not well-formed JSON.
    #[serde(default)]
    pub malformed_body: FailureMode,
    /// Policy reply could not be read (timeout, connection failure).
    #[serde(default)]
    pub policy_unavailable: FailureMode,
}
