//! Gateway config loader (strict parsing).
//!
//! Two surfaces share the same rules:
//! - the plugin configuration blob (JSON), as a proxy host would hand it over
//!   at plugin start;
//! - the standalone gateway file (YAML), which embeds the plugin section.

pub mod plugin;
pub mod schema;

use std::fs;

use quotagate_core::error::{QuotaGateError, Result};

pub use plugin::{FailureMode, FailureModeConfig, PluginConfig, PolicyCallConfig};
pub use schema::{GatewayConfig, GatewaySection};

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| QuotaGateError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| QuotaGateError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
