//! Host contract.
//!
//! The filter never owns the connection. A host (a proxy ABI shim, the
//! standalone axum server in `transport`, a test double) delivers lifecycle
//! events to `QuotaFilter` and exposes these primitives back to it. Request
//! ids are assigned by the host and passed explicitly on every call.

use std::time::Duration;

use bytes::Bytes;

use quotagate_core::error::Result;

/// Host-assigned request identifier.
pub type RequestId = u32;

/// Host-assigned handle for one dispatched outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallToken(pub u32);

impl std::fmt::Display for CallToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the host should do with the request after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Keep processing toward the upstream.
    Continue,
    /// Hold the request; the filter (or a pending callback) will finish it.
    Pause,
}

/// Outbound HTTP call description.
/// Pseudo-headers (`:method`, `:path`, `:authority`) travel in `headers`.
#[derive(Debug, Clone)]
pub struct OutboundCall {
    /// Named endpoint the host must resolve.
    pub upstream: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Duration,
}

impl OutboundCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn method(&self) -> Option<&str> {
        self.header(":method")
    }

    pub fn path(&self) -> Option<&str> {
        self.header(":path")
    }
}

/// Primitives the filter requires from its host.
pub trait Host {
    fn request_header(&self, id: RequestId, name: &str) -> Option<String>;

    /// Accumulated request body, `start..start + size`. Valid after the final chunk.
    fn request_body(&self, id: RequestId, start: usize, size: usize) -> Result<Bytes>;

    /// Terminal: answer the client directly.
    fn send_response(
        &mut self,
        id: RequestId,
        status: u16,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<()>;

    /// Terminal: release a paused request toward its upstream.
    fn resume_request(&mut self, id: RequestId) -> Result<()>;

    /// Start an async call. On `Ok`, the host must invoke
    /// `QuotaFilter::on_call_response` exactly once for the returned token,
    /// including on timeout or connection failure. On `Err`, it never will.
    /// The completion may run on another thread, even before this returns.
    fn dispatch_call(&mut self, id: RequestId, call: OutboundCall) -> Result<CallToken>;

    /// Reply body of a completed call. Only meaningful inside the completion callback.
    fn call_response_body(&self, token: CallToken, start: usize, size: usize) -> Result<Bytes>;
}
