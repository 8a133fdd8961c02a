use std::collections::BTreeMap;

use serde::Deserialize;
use quotagate_core::error::{QuotaGateError, Result};

use super::plugin::PluginConfig;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    /// Named endpoints for outbound calls: name -> base URL.
    #[serde(default)]
    pub clusters: BTreeMap<String, String>,

    #[serde(default)]
    pub plugin: PluginConfig,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(QuotaGateError::UnsupportedVersion);
        }

        self.gateway.validate()?;

        for (name, url) in &self.clusters {
            if name.is_empty() {
                return Err(QuotaGateError::BadConfig("cluster name must not be empty".into()));
            }
            check_base_url(&format!("clusters.{name}"), url)?;
        }

        self.plugin.validate()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Base URL admitted requests are forwarded to.
    #[serde(default = "default_upstream")]
    pub upstream: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            upstream: default_upstream(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if self.listen.is_empty() {
            return Err(QuotaGateError::BadConfig("gateway.listen must not be empty".into()));
        }
        check_base_url("gateway.upstream", &self.upstream)
    }
}

fn check_base_url(field: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(());
    }
    Err(QuotaGateError::BadConfig(format!(
        "{field} must be an http(s) base url, got: {url}"
    )))
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_upstream() -> String {
    "http://127.0.0.1:8000".into()
}
