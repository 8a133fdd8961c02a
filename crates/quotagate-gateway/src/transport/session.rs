//! One intercepted HTTP request driven through the filter.
//!
//! Lifecycle per request:
//! - headers -> `on_request_headers`
//! - each body frame -> `on_request_body(len, false)`, then a final
//!   zero-length `on_request_body(0, true)` once the stream ends
//! - a dispatched call runs under its own timeout; success or failure is
//!   reported through `on_call_response`
//! - the recorded terminal action picks the reply: local response, or the
//!   buffered request forwarded upstream

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tracing::Instrument;

use quotagate_core::error::{QuotaGateError, Result};

use crate::app_state::AppState;
use crate::filter::QuotaFilter;
use crate::host::{Action, CallToken, Host, OutboundCall, RequestId};
use crate::transport::outbound::OutboundClient;

/// Terminal action recorded by the filter.
#[derive(Debug)]
pub enum HostOutcome {
    Respond {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    },
    Resume,
}

/// Host side of a single request.
pub struct SessionHost {
    id: RequestId,
    headers: HeaderMap,
    body: BytesMut,
    outbound: OutboundClient,
    tokens: Arc<AtomicU32>,
    outcome: Option<HostOutcome>,
    pending: Option<(CallToken, OutboundCall)>,
    reply: Option<(CallToken, Bytes)>,
}

impl SessionHost {
    pub fn new(
        id: RequestId,
        headers: HeaderMap,
        outbound: OutboundClient,
        tokens: Arc<AtomicU32>,
    ) -> Self {
        Self {
            id,
            headers,
            body: BytesMut::new(),
            outbound,
            tokens,
            outcome: None,
            pending: None,
            reply: None,
        }
    }

    pub fn append_body(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    pub fn has_outcome(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn take_outcome(&mut self) -> Option<HostOutcome> {
        self.outcome.take()
    }

    pub fn take_pending_call(&mut self) -> Option<(CallToken, OutboundCall)> {
        self.pending.take()
    }

    pub fn take_body(&mut self) -> Bytes {
        std::mem::take(&mut self.body).freeze()
    }

    /// Run a dispatched call to completion or timeout.
    /// Returns `(num_headers, body_size)` for the completion callback;
    /// a failed call leaves no reply behind, so reading its body fails.
    pub async fn complete_call(&mut self, token: CallToken, call: &OutboundCall) -> (usize, usize) {
        match tokio::time::timeout(call.timeout, self.outbound.execute_call(call)).await {
            Ok(Ok(reply)) => {
                tracing::debug!(token = %token, status = reply.status, "policy call replied");
                let sizes = (reply.num_headers, reply.body.len());
                self.reply = Some((token, reply.body));
                sizes
            }
            Ok(Err(e)) => {
                tracing::warn!(token = %token, error = %e, "policy call failed");
                (0, 0)
            }
            Err(_) => {
                tracing::warn!(
                    token = %token,
                    timeout_ms = call.timeout.as_millis() as u64,
                    "policy call timed out"
                );
                (0, 0)
            }
        }
    }

    fn check_id(&self, id: RequestId) -> Result<()> {
        if id == self.id {
            return Ok(());
        }
        Err(QuotaGateError::Host(format!(
            "request id mismatch: session {} got {id}",
            self.id
        )))
    }

    fn check_open(&self) -> Result<()> {
        if self.outcome.is_some() {
            return Err(QuotaGateError::Host("terminal action already taken".into()));
        }
        Ok(())
    }
}

fn slice(buf: &[u8], start: usize, size: usize) -> Result<Bytes> {
    let end = start
        .checked_add(size)
        .ok_or_else(|| QuotaGateError::Host("range overflow".into()))?;
    buf.get(start..end)
        .map(Bytes::copy_from_slice)
        .ok_or_else(|| {
            QuotaGateError::Host(format!(
                "range {start}..{end} out of bounds ({} bytes)",
                buf.len()
            ))
        })
}

impl Host for SessionHost {
    fn request_header(&self, id: RequestId, name: &str) -> Option<String> {
        if id != self.id {
            return None;
        }
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    fn request_body(&self, id: RequestId, start: usize, size: usize) -> Result<Bytes> {
        self.check_id(id)?;
        slice(&self.body, start, size)
    }

    fn send_response(
        &mut self,
        id: RequestId,
        status: u16,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<()> {
        self.check_id(id)?;
        self.check_open()?;
        self.outcome = Some(HostOutcome::Respond {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: Bytes::copy_from_slice(body),
        });
        Ok(())
    }

    fn resume_request(&mut self, id: RequestId) -> Result<()> {
        self.check_id(id)?;
        self.check_open()?;
        self.outcome = Some(HostOutcome::Resume);
        Ok(())
    }

    fn dispatch_call(&mut self, id: RequestId, call: OutboundCall) -> Result<CallToken> {
        self.check_id(id)?;
        if self.pending.is_some() {
            return Err(QuotaGateError::Dispatch("a call is already in flight".into()));
        }
        if self.outbound.resolve_cluster(&call.upstream).is_none() {
            return Err(QuotaGateError::Dispatch(format!(
                "unknown cluster: {}",
                call.upstream
            )));
        }
        let token = CallToken(self.tokens.fetch_add(1, Ordering::Relaxed));
        self.pending = Some((token, call));
        Ok(token)
    }

    fn call_response_body(&self, token: CallToken, start: usize, size: usize) -> Result<Bytes> {
        match &self.reply {
            Some((t, body)) if *t == token => slice(body, start, size),
            _ => Err(QuotaGateError::Host(format!("no response for call {token}"))),
        }
    }
}

/// Releases filter state however the handler future ends (including client abort).
struct DoneGuard {
    filter: Arc<QuotaFilter>,
    id: RequestId,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.filter.on_request_done(self.id);
    }
}

/// Fallback handler: every non-ops request passes through here.
pub async fn intercept(State(app): State<AppState>, req: Request) -> Response {
    let id = app.next_request_id();
    let span = tracing::info_span!(
        "request",
        request_id = id,
        method = %req.method(),
        path = %req.uri().path()
    );
    run_request(app, id, req).instrument(span).await
}

async fn run_request(app: AppState, id: RequestId, req: Request) -> Response {
    let filter = app.filter();
    let _done = DoneGuard {
        filter: Arc::clone(&filter),
        id,
    };

    let (parts, body) = req.into_parts();
    let mut host = SessionHost::new(id, parts.headers.clone(), app.outbound(), app.call_tokens());

    let mut action = filter.on_request_headers(&mut host, id);

    if !host.has_outcome() {
        let mut frames = body.into_data_stream();
        while let Some(frame) = frames.next().await {
            let chunk = match frame {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read request body");
                    let body = Bytes::from_static(b"failed to read request body");
                    return local_reply(400, &[], body);
                }
            };
            host.append_body(&chunk);
            if filter.is_tracking(id) {
                action = filter.on_request_body(&mut host, id, chunk.len(), false);
            }
            if host.has_outcome() {
                break;
            }
        }
        if !host.has_outcome() && filter.is_tracking(id) {
            action = filter.on_request_body(&mut host, id, 0, true);
        }
    }

    if let Some((token, call)) = host.take_pending_call() {
        let (num_headers, body_size) = host.complete_call(token, &call).await;
        filter.on_call_response(&mut host, token, num_headers, body_size, 0);
    }

    match host.take_outcome() {
        Some(HostOutcome::Respond { status, headers, body }) => {
            let headers: Vec<(&str, &str)> = headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            local_reply(status, &headers, body)
        }
        Some(HostOutcome::Resume) => forward(&app, &parts, host.take_body()).await,
        None if action == Action::Continue => forward(&app, &parts, host.take_body()).await,
        None => {
            tracing::error!("request left suspended without a terminal action");
            local_reply(500, &[], Bytes::from_static(b"Internal error."))
        }
    }
}

async fn forward(app: &AppState, parts: &Parts, body: Bytes) -> Response {
    match app.outbound().forward(parts, body).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(error = %e, "upstream forward failed");
            app.metrics().upstream_errors.inc(&[]);
            local_reply(
                e.reject_code().status(),
                &[],
                Bytes::from_static(b"upstream unavailable"),
            )
        }
    }
}

fn local_reply(status: u16, headers: &[(&str, &str)], body: Bytes) -> Response {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    for (k, v) in headers {
        match (HeaderName::try_from(*k), HeaderValue::try_from(*v)) {
            (Ok(name), Ok(value)) => {
                resp.headers_mut().append(name, value);
            }
            _ => tracing::warn!(header = %k, "dropping invalid response header"),
        }
    }
    resp
}
