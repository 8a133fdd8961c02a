//! Shared application state for the standalone gateway.
//!
//! Compiles the plugin section once (plugin start), builds the outbound
//! client, and hands out per-request ids and call tokens.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use quotagate_core::error::{QuotaGateError, Result};

use crate::config::GatewayConfig;
use crate::filter::{FilterSettings, QuotaFilter};
use crate::obs::metrics::GatewayMetrics;
use crate::transport::outbound::OutboundClient;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    filter: Arc<QuotaFilter>,
    metrics: Arc<GatewayMetrics>,
}

struct AppStateInner {
    outbound: OutboundClient,
    request_ids: AtomicU32,
    call_tokens: Arc<AtomicU32>,
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can report bad configuration instead of panicking.
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        let settings = FilterSettings::compile(&cfg.plugin)
            .map_err(|e| QuotaGateError::BadConfig(format!("plugin start failed: {e}")))?;

        // Warn only; admitted requests then fail dispatch with 403.
        let policy_upstream = settings.policy.upstream();
        if !cfg.clusters.contains_key(policy_upstream) {
            tracing::warn!(
                upstream = %policy_upstream,
                "policy upstream is not a configured cluster"
            );
        }

        let outbound = OutboundClient::new(&cfg.gateway.upstream, cfg.clusters)?;
        let metrics = Arc::new(GatewayMetrics::default());
        let filter = Arc::new(QuotaFilter::new(settings, Arc::clone(&metrics)));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                outbound,
                request_ids: AtomicU32::new(1),
                call_tokens: Arc::new(AtomicU32::new(1)),
            }),
            filter,
            metrics,
        })
    }

    pub fn filter(&self) -> Arc<QuotaFilter> {
        Arc::clone(&self.filter)
    }

    pub fn outbound(&self) -> OutboundClient {
        self.inner.outbound.clone()
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn next_request_id(&self) -> u32 {
        self.inner.request_ids.fetch_add(1, Ordering::Relaxed)
    }

    pub fn call_tokens(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.inner.call_tokens)
    }

    pub fn set_draining(&self) {
        self.metrics.set_draining();
    }

    pub fn is_draining(&self) -> bool {
        self.metrics.is_draining()
    }

    /// Gauge lines computed at scrape time.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![("quotagate_requests_in_flight", self.filter.in_flight() as u64)]
    }
}
