//! Outbound HTTP (reqwest): policy calls and upstream forwarding.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{request::Parts, HeaderMap, Method};
use axum::response::Response;
use bytes::Bytes;

use quotagate_core::error::{QuotaGateError, Result};

use crate::host::OutboundCall;

/// Reply of a completed outbound call.
#[derive(Debug, Clone)]
pub struct CallReply {
    pub status: u16,
    pub num_headers: usize,
    pub body: Bytes,
}

#[derive(Clone)]
pub struct OutboundClient {
    http: reqwest::Client,
    upstream: Arc<str>,
    clusters: Arc<BTreeMap<String, String>>,
}

impl OutboundClient {
    pub fn new(upstream: &str, clusters: BTreeMap<String, String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| QuotaGateError::Internal(format!("http client init failed: {e}")))?;
        Ok(Self {
            http,
            upstream: Arc::from(upstream.trim_end_matches('/')),
            clusters: Arc::new(clusters),
        })
    }

    /// Base URL of a named cluster.
    pub fn resolve_cluster(&self, name: &str) -> Option<&str> {
        self.clusters.get(name).map(|u| u.trim_end_matches('/'))
    }

    /// Execute a dispatched call. The caller enforces the call timeout.
    pub async fn execute_call(&self, call: &OutboundCall) -> Result<CallReply> {
        let base = self
            .resolve_cluster(&call.upstream)
            .ok_or_else(|| {
                QuotaGateError::Dispatch(format!("unknown cluster: {}", call.upstream))
            })?;

        let method = Method::from_bytes(call.method().unwrap_or("POST").as_bytes())
            .map_err(|e| QuotaGateError::Dispatch(format!("invalid :method: {e}")))?;
        let url = format!("{}{}", base, call.path().unwrap_or("/"));

        let mut req = self.http.request(method, url);
        for (k, v) in call.headers.iter().filter(|(k, _)| !k.starts_with(':')) {
            req = req.header(k.as_str(), v.as_str());
        }

        let resp = req
            .body(call.body.clone())
            .send()
            .await
            .map_err(|e| QuotaGateError::Upstream(format!("policy call failed: {e}")))?;

        let status = resp.status().as_u16();
        let num_headers = resp.headers().len();
        let body = resp
            .bytes()
            .await
            .map_err(|e| QuotaGateError::Upstream(format!("policy reply body error: {e}")))?;

        Ok(CallReply { status, num_headers, body })
    }

    /// Forward an admitted request to the upstream and relay its response.
    pub async fn forward(&self, parts: &Parts, body: Bytes) -> Result<Response> {
        let path = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.upstream, path);

        let resp = self
            .http
            .request(parts.method.clone(), url)
            .headers(strip_hop_by_hop(&parts.headers))
            .body(body)
            .send()
            .await
            .map_err(|e| QuotaGateError::Upstream(format!("forward failed: {e}")))?;

        let status = resp.status();
        let headers = strip_hop_by_hop(resp.headers());
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| QuotaGateError::Upstream(format!("upstream body error: {e}")))?;

        let mut out = Response::new(Body::from(bytes));
        *out.status_mut() = status;
        *out.headers_mut() = headers;
        Ok(out)
    }
}

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "content-length",
    "host",
    "te",
    "upgrade",
];

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP {
        out.remove(name);
    }
    out
}
