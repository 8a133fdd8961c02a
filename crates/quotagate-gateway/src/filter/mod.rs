//! Request interception filter.
//!
//! `QuotaFilter` is the dispatch table for host events:
//! - `on_request_headers`: content-type gate, creates the request state
//! - `on_request_body`: chunk accounting; at end-of-stream validates,
//!   summarizes and dispatches the policy call, then suspends
//! - `on_call_response`: turns the policy reply into resume / reject
//! - `on_request_done`: releases whatever the request left behind
//!
//! A request's state is taken out of the table for the duration of each
//! event and only put back while the request stays suspended, so a terminal
//! action can never be taken twice for the same id.
//!
//! A multi-threaded host may deliver a completion before `dispatch_call` has
//! returned to the filter. Such a completion is held in the call table as
//! `CallSlot::Early` and replayed as soon as the dispatching event registers
//! its token. Held completions nobody claims are pruned inline after
//! `EARLY_COMPLETION_TTL`.

pub mod body;
pub mod decision;
pub mod gate;
pub mod policy_client;
pub mod state;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use quotagate_core::error::{QuotaGateError, RejectCode, Result};
use quotagate_core::keys::RequiredKeySet;
use quotagate_core::protocol::payload::{validate_payload, Validation};
use quotagate_core::protocol::summary::PayloadSummary;
use serde_json::Value;

use crate::config::{FailureMode, FailureModeConfig, PluginConfig};
use crate::host::{Action, CallToken, Host, RequestId};
use crate::obs::metrics::GatewayMetrics;

use body::BodyProgress;
use decision::{CallOutcome, Decision};
use gate::GateDecision;
use policy_client::PolicyClient;
use state::{Phase, RequestState};

/// Local response that terminates a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub code: RejectCode,
    pub msg: &'static str,
}

impl Rejection {
    pub const CONTENT_TYPE: Rejection = Rejection {
        code: RejectCode::Forbidden,
        msg: "content-type must be provided",
    };
    pub const INVALID_JSON: Rejection = Rejection {
        code: RejectCode::Forbidden,
        msg: "Invalid JSON payload.",
    };
    pub const MISSING_KEY: Rejection = Rejection {
        code: RejectCode::Forbidden,
        msg: "Missing key in JSON payload.",
    };
    pub const AUTHORIZATION_FAILED: Rejection = Rejection {
        code: RejectCode::Forbidden,
        msg: "Authorization failed.",
    };
    pub const PAYLOAD_TOO_LARGE: Rejection = Rejection {
        code: RejectCode::PayloadTooLarge,
        msg: "Payload too large.",
    };
    pub const QUOTA_EXCEEDED: Rejection = Rejection {
        code: RejectCode::QuotaExceeded,
        msg: "Quota exceeded",
    };
    pub const POLICY_UNAVAILABLE: Rejection = Rejection {
        code: RejectCode::Unavailable,
        msg: "Quota service unavailable.",
    };
    pub const INTERNAL: Rejection = Rejection {
        code: RejectCode::Internal,
        msg: "Internal error.",
    };

    pub fn status(&self) -> u16 {
        self.code.status()
    }
}

/// Compiled, read-only filter settings.
/// Construct once at plugin start, then share via Arc.
#[derive(Debug, Clone)]
pub struct FilterSettings {
    pub required_keys: RequiredKeySet,
    pub max_body_bytes: Option<usize>,
    pub policy: PolicyClient,
    pub failure: FailureModeConfig,
}

impl FilterSettings {
    pub fn compile(cfg: &PluginConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            required_keys: RequiredKeySet::compile(&cfg.required_keys)?,
            max_body_bytes: cfg.max_body_bytes,
            policy: PolicyClient::new(&cfg.policy),
            failure: cfg.failure_mode,
        })
    }

    /// Plugin start from the raw configuration blob.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Self::compile(&PluginConfig::from_json(data)?)
    }
}

const EARLY_COMPLETION_TTL: Duration = Duration::from_secs(30);

/// Sizes reported by the host with a call completion.
#[derive(Debug, Clone, Copy)]
struct Completion {
    num_headers: usize,
    body_size: usize,
    num_trailers: usize,
}

/// Call table entry.
#[derive(Debug, Clone, Copy)]
enum CallSlot {
    /// Registered by its request; waiting for the completion.
    Pending(RequestId),
    /// Completion delivered before the token was registered.
    Early { completion: Completion, at: Instant },
}

pub struct QuotaFilter {
    settings: Arc<FilterSettings>,
    requests: DashMap<RequestId, RequestState>,
    calls: DashMap<CallToken, CallSlot>,
    metrics: Arc<GatewayMetrics>,
}

impl QuotaFilter {
    pub fn new(settings: FilterSettings, metrics: Arc<GatewayMetrics>) -> Self {
        tracing::info!(
            required_keys = settings.required_keys.len(),
            policy_upstream = %settings.policy.upstream(),
            "quota filter configured"
        );
        Self {
            settings: Arc::new(settings),
            requests: DashMap::new(),
            calls: DashMap::new(),
            metrics,
        }
    }

    /// Requests currently suspended (buffering or awaiting a verdict).
    pub fn in_flight(&self) -> usize {
        self.requests.len()
    }

    pub fn is_tracking(&self, id: RequestId) -> bool {
        self.requests.contains_key(&id)
    }

    pub fn on_request_headers(&self, host: &mut dyn Host, id: RequestId) -> Action {
        if self.requests.contains_key(&id) {
            tracing::error!(request_id = id, "headers delivered twice; ignoring");
            return Action::Continue;
        }
        self.metrics.requests.inc(&[]);

        let content_type = host.request_header(id, "content-type");
        match gate::check_content_type(content_type.as_deref()) {
            GateDecision::Pass => {
                self.requests
                    .insert(id, RequestState::new(id, self.settings.max_body_bytes));
                Action::Continue
            }
            GateDecision::Reject(rej) => {
                tracing::warn!(
                    request_id = id,
                    content_type = ?content_type,
                    "rejecting request: bad content-type"
                );
                self.reject(host, id, rej)
            }
        }
    }

    pub fn on_request_body(
        &self,
        host: &mut dyn Host,
        id: RequestId,
        chunk_size: usize,
        end_of_stream: bool,
    ) -> Action {
        let Some((_, mut state)) = self.requests.remove(&id) else {
            tracing::debug!(request_id = id, "body event for untracked request");
            return Action::Continue;
        };

        let progress = match &mut state.phase {
            Phase::Buffering(acc) => acc.push(chunk_size, end_of_stream),
            Phase::AwaitingVerdict { .. } => Err(QuotaGateError::BodyAfterEnd),
        };

        match progress {
            Ok(BodyProgress::NeedMore) => {
                self.requests.insert(id, state);
                Action::Pause
            }
            Ok(BodyProgress::Complete { total }) => self.on_body_complete(host, state, total),
            Err(QuotaGateError::PayloadTooLarge) => {
                tracing::warn!(
                    request_id = id,
                    limit = ?self.settings.max_body_bytes,
                    "rejecting request: body too large"
                );
                self.reject(host, id, Rejection::PAYLOAD_TOO_LARGE)
            }
            Err(e) => {
                tracing::error!(request_id = id, error = %e, "body event refused");
                // Still suspended on its policy call; the callback finishes it.
                self.requests.insert(id, state);
                Action::Pause
            }
        }
    }

    fn on_body_complete(&self, host: &mut dyn Host, state: RequestState, total: usize) -> Action {
        let id = state.id;

        let body = match host.request_body(id, 0, total) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(request_id = id, total, error = %e, "failed to get request body");
                return self.reject(host, id, Rejection::INTERNAL);
            }
        };

        match validate_payload(&body, &self.settings.required_keys) {
            Validation::Malformed(e) => match self.settings.failure.malformed_body {
                FailureMode::Allow => {
                    tracing::warn!(
                        request_id = id,
                        error = %e,
                        "body is not valid json; passing through"
                    );
                    self.metrics.decisions.inc(&[("outcome", "passed_through")]);
                    Action::Continue
                }
                FailureMode::Reject => {
                    tracing::warn!(
                        request_id = id,
                        error = %e,
                        "rejecting request: body is not valid json"
                    );
                    self.reject(host, id, Rejection::INVALID_JSON)
                }
            },
            Validation::MissingKey(key) => {
                tracing::warn!(
                    request_id = id,
                    key = %key,
                    "rejecting request: required key is missing"
                );
                self.reject(host, id, Rejection::MISSING_KEY)
            }
            Validation::Valid(doc) => self.dispatch(host, state, &doc),
        }
    }

    fn dispatch(&self, host: &mut dyn Host, mut state: RequestState, doc: &Value) -> Action {
        let id = state.id;
        let summary = PayloadSummary::from_document(doc);

        let call = match self.settings.policy.build_call(&summary) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(request_id = id, error = %e, "failed to build policy call");
                return self.reject(host, id, Rejection::INTERNAL);
            }
        };

        match self.settings.policy.dispatch(host, id, call) {
            Ok(token) => {
                tracing::debug!(request_id = id, token = %token, "policy call dispatched");
                self.metrics.policy_calls.inc(&[("result", "dispatched")]);
                state.await_verdict(token);
                // State first: a completion claiming the slot must find it.
                self.requests.insert(id, state);
                self.register_call(host, id, token);
                Action::Pause
            }
            Err(e) => {
                tracing::error!(
                    request_id = id,
                    error = %e,
                    summary = ?summary,
                    "dispatch policy call failed"
                );
                self.metrics.policy_calls.inc(&[("result", "dispatch_failed")]);
                self.reject(host, id, Rejection::AUTHORIZATION_FAILED)
            }
        }
    }

    fn register_call(&self, host: &mut dyn Host, id: RequestId, token: CallToken) {
        let early = match self.calls.entry(token) {
            Entry::Vacant(e) => {
                e.insert(CallSlot::Pending(id));
                return;
            }
            Entry::Occupied(e) => {
                let slot = *e.get();
                match slot {
                    CallSlot::Early { completion, .. } => {
                        e.remove();
                        Some(completion)
                    }
                    CallSlot::Pending(owner) => {
                        tracing::error!(
                            request_id = id,
                            owner,
                            token = %token,
                            "host reused a live call token"
                        );
                        None
                    }
                }
            }
        };

        match early {
            Some(completion) => {
                tracing::debug!(request_id = id, token = %token, "replaying early completion");
                self.complete_call(host, token, id, completion);
            }
            None => {
                self.requests.remove(&id);
                self.reject(host, id, Rejection::INTERNAL);
            }
        }
    }

    pub fn on_call_response(
        &self,
        host: &mut dyn Host,
        token: CallToken,
        num_headers: usize,
        body_size: usize,
        num_trailers: usize,
    ) {
        let completion = Completion {
            num_headers,
            body_size,
            num_trailers,
        };

        let claimed = match self.calls.entry(token) {
            Entry::Occupied(e) => {
                let slot = *e.get();
                match slot {
                    CallSlot::Pending(id) => {
                        e.remove();
                        Some(id)
                    }
                    CallSlot::Early { .. } => {
                        tracing::warn!(
                            token = %token,
                            "duplicate callback for unclaimed policy call"
                        );
                        None
                    }
                }
            }
            Entry::Vacant(e) => {
                tracing::debug!(token = %token, "callback before registration; holding it");
                e.insert(CallSlot::Early {
                    completion,
                    at: Instant::now(),
                });
                None
            }
        };

        match claimed {
            Some(id) => self.complete_call(host, token, id, completion),
            None => self.prune_early(),
        }
    }

    fn complete_call(
        &self,
        host: &mut dyn Host,
        token: CallToken,
        id: RequestId,
        c: Completion,
    ) {
        let Some((_, state)) = self.requests.remove(&id) else {
            tracing::debug!(request_id = id, token = %token, "callback after request finished");
            return;
        };
        if state.pending_call() != Some(token) {
            tracing::error!(
                request_id = id,
                token = %token,
                "callback token does not match pending call"
            );
            self.requests.insert(id, state);
            return;
        }

        if let Some(waited) = state.waited() {
            self.metrics.policy_call_duration.observe(&[], waited);
        }
        tracing::debug!(
            request_id = id,
            num_headers = c.num_headers,
            body_size = c.body_size,
            num_trailers = c.num_trailers,
            "policy call completed"
        );

        let outcome = match host.call_response_body(token, 0, c.body_size) {
            Ok(body) => {
                self.metrics.policy_calls.inc(&[("result", "completed")]);
                CallOutcome::Reply(body)
            }
            Err(e) => {
                tracing::warn!(request_id = id, error = %e, "failed to get policy response body");
                self.metrics.policy_calls.inc(&[("result", "failed")]);
                CallOutcome::Failed(e)
            }
        };

        let decision = decision::decide(&outcome, self.settings.failure.policy_unavailable);
        self.apply(host, id, decision);
    }

    /// Drop held completions that no dispatch claimed in time.
    fn prune_early(&self) {
        self.calls.retain(|token, slot| match slot {
            CallSlot::Early { at, .. } if at.elapsed() > EARLY_COMPLETION_TTL => {
                tracing::warn!(token = %token, "dropping unclaimed policy call completion");
                false
            }
            _ => true,
        });
    }

    /// Host signals the request is gone (completed or aborted by the client).
    pub fn on_request_done(&self, id: RequestId) {
        if let Some((_, state)) = self.requests.remove(&id) {
            if let Some(token) = state.pending_call() {
                self.calls.remove(&token);
            }
            tracing::debug!(request_id = id, "request ended while suspended; state released");
        }
    }

    fn apply(&self, host: &mut dyn Host, id: RequestId, decision: Decision) {
        self.metrics.decisions.inc(&[("outcome", decision.outcome_label())]);
        match decision {
            Decision::Resume => {
                if let Err(e) = host.resume_request(id) {
                    tracing::error!(request_id = id, error = %e, "failed to resume request");
                }
            }
            Decision::PassThrough => {
                tracing::warn!(
                    request_id = id,
                    "policy verdict unavailable; passing request through"
                );
                if let Err(e) = host.resume_request(id) {
                    tracing::error!(request_id = id, error = %e, "failed to resume request");
                }
            }
            Decision::Reject(rej) => {
                tracing::info!(request_id = id, status = rej.status(), "request denied by policy");
                self.reject(host, id, rej);
            }
        }
    }

    /// Send a local response. Caller has already dropped the request state.
    fn reject(&self, host: &mut dyn Host, id: RequestId, rej: Rejection) -> Action {
        self.metrics.rejections.inc(&[("code", rej.code.as_str())]);
        let headers = [("content-type", "text/plain")];
        match host.send_response(id, rej.status(), &headers, rej.msg.as_bytes()) {
            Ok(()) => Action::Pause,
            Err(e) => {
                tracing::error!(
                    request_id = id,
                    status = rej.status(),
                    error = %e,
                    "failed to send local response"
                );
                Action::Continue
            }
        }
    }
}
