//! Per-request state.

use std::time::{Duration, Instant};

use crate::host::{CallToken, RequestId};

use super::body::BodyAccumulator;

#[derive(Debug)]
pub enum Phase {
    /// Collecting body chunks.
    Buffering(BodyAccumulator),
    /// Policy call dispatched; suspended until its callback.
    AwaitingVerdict { token: CallToken, since: Instant },
}

/// One in-flight request. Lives in the filter's table only while the
/// request is suspended; every terminal action drops it.
#[derive(Debug)]
pub struct RequestState {
    pub id: RequestId,
    pub phase: Phase,
}

impl RequestState {
    pub fn new(id: RequestId, body_limit: Option<usize>) -> Self {
        Self {
            id,
            phase: Phase::Buffering(BodyAccumulator::new(body_limit)),
        }
    }

    pub fn await_verdict(&mut self, token: CallToken) {
        self.phase = Phase::AwaitingVerdict {
            token,
            since: Instant::now(),
        };
    }

    pub fn pending_call(&self) -> Option<CallToken> {
        match self.phase {
            Phase::AwaitingVerdict { token, .. } => Some(token),
            Phase::Buffering(_) => None,
        }
    }

    /// Time spent waiting for the verdict so far.
    pub fn waited(&self) -> Option<Duration> {
        match self.phase {
            Phase::AwaitingVerdict { since, .. } => Some(since.elapsed()),
            Phase::Buffering(_) => None,
        }
    }
}
