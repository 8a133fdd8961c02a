//! Payload and policy wire protocol.
//!
//! - `payload`: JSON well-formedness + required key presence.
//! - `summary`: aggregate statistics sent to the policy service.
//! - `verdict`: allow/deny extraction from the policy reply.
//!
//! Everything here is pure; the gateway decides what a result means for the
//! request (respond, continue, or dispatch).

pub mod payload;
pub mod summary;
pub mod verdict;
