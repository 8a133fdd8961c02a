//! Request body accounting across chunk events.
//!
//! The host keeps the bytes; the accumulator only tracks how many have been
//! delivered so the full range can be pulled at end-of-stream.

use quotagate_core::error::{QuotaGateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyProgress {
    /// More chunks expected; hold the request.
    NeedMore,
    /// End-of-stream reached with `total` bytes delivered.
    Complete { total: usize },
}

#[derive(Debug)]
pub struct BodyAccumulator {
    total: usize,
    complete: bool,
    limit: Option<usize>,
}

impl BodyAccumulator {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            total: 0,
            complete: false,
            limit,
        }
    }

    /// Account one chunk. Totals only grow; nothing is accepted after the final chunk.
    pub fn push(&mut self, chunk_size: usize, end_of_stream: bool) -> Result<BodyProgress> {
        if self.complete {
            return Err(QuotaGateError::BodyAfterEnd);
        }

        self.total = self.total.saturating_add(chunk_size);
        if let Some(limit) = self.limit {
            if self.total > limit {
                return Err(QuotaGateError::PayloadTooLarge);
            }
        }

        if !end_of_stream {
            return Ok(BodyProgress::NeedMore);
        }
        self.complete = true;
        Ok(BodyProgress::Complete { total: self.total })
    }
}
