//! Request lifecycle through the quota filter against a recording host.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use quotagate_gateway::filter::QuotaFilter;
use quotagate_gateway::host::{Action, CallToken};

use mock_host::{filter, MockHost};

const JSON: Option<&str> = Some("application/json");
const ALLOW: &[u8] = br#"{"result": {"allow": true}}"#;
const DENY: &[u8] = br#"{"result": {"allow": false}}"#;

/// Deliver the whole body as one final chunk.
fn deliver(f: &QuotaFilter, host: &mut MockHost, id: u32) -> Action {
    let len = host.bodies[&id].len();
    assert_eq!(f.on_request_headers(host, id), Action::Continue);
    f.on_request_body(host, id, len, true)
}

#[test]
fn wrong_content_type_is_rejected_before_body() {
    let (f, metrics) = filter(r#"{"requiredKeys": ["ids"]}"#);
    let cases = [None, Some("text/plain"), Some("application/json; charset=utf-8")];

    for (i, ct) in cases.into_iter().enumerate() {
        let id = i as u32 + 1;
        let mut host = MockHost::new().with_request(id, ct, br#"{"ids": []}"#);

        assert_eq!(f.on_request_headers(&mut host, id), Action::Pause);
        assert_eq!(host.responses.len(), 1);
        assert_eq!(host.responses[0].status, 403);
        assert_eq!(host.responses[0].body, "content-type must be provided");
        assert!(!f.is_tracking(id));

        // A stray body event is ignored: no pull, no dispatch.
        assert_eq!(f.on_request_body(&mut host, id, 11, true), Action::Continue);
        assert!(host.pulls().is_empty());
        assert!(host.calls.is_empty());
    }
    assert_eq!(metrics.rejections.get(&[("code", "FORBIDDEN")]), 3);
}

#[test]
fn chunks_accumulate_until_end_of_stream() {
    let (f, _) = filter("");
    let body = br#"{"documents": ["ab", "abcd"]}"#;
    let mut host = MockHost::new().with_request(7, JSON, body);

    assert_eq!(f.on_request_headers(&mut host, 7), Action::Continue);
    assert_eq!(f.on_request_body(&mut host, 7, 10, false), Action::Pause);
    assert_eq!(f.on_request_body(&mut host, 7, 0, false), Action::Pause);
    assert_eq!(f.on_request_body(&mut host, 7, 10, false), Action::Pause);
    assert!(host.pulls().is_empty(), "no pull before end-of-stream");

    let rest = body.len() - 20;
    assert_eq!(f.on_request_body(&mut host, 7, rest, true), Action::Pause);
    assert_eq!(host.pulls(), vec![(7, 0, body.len())]);
    assert_eq!(host.calls.len(), 1);
}

#[test]
fn empty_body_fails_json_validation() {
    let (f, _) = filter("");
    let mut host = MockHost::new().with_request(1, JSON, b"");

    assert_eq!(deliver(&f, &mut host, 1), Action::Pause);
    assert_eq!(host.pulls(), vec![(1, 0, 0)]);
    assert_eq!(host.responses[0].status, 403);
    assert_eq!(host.responses[0].body, "Invalid JSON payload.");
    assert!(host.calls.is_empty());
    assert!(!f.is_tracking(1));
}

#[test]
fn malformed_body_passes_through_when_allowed() {
    let (f, metrics) = filter(r#"{"failureMode": {"malformedBody": "allow"}}"#);
    let mut host = MockHost::new().with_request(1, JSON, b"{\"ids\": [");

    assert_eq!(deliver(&f, &mut host, 1), Action::Continue);
    assert!(host.responses.is_empty());
    assert!(host.calls.is_empty());
    assert!(!f.is_tracking(1));
    assert_eq!(metrics.decisions.get(&[("outcome", "passed_through")]), 1);
}

#[test]
fn missing_required_key_is_rejected() {
    let (f, _) = filter(r#"{"requiredKeys": ["ids", "embeddings", "documents"]}"#);
    let mut host = MockHost::new().with_request(3, JSON, br#"{"ids": ["a"], "documents": null}"#);

    assert_eq!(deliver(&f, &mut host, 3), Action::Pause);
    assert_eq!(host.responses.len(), 1);
    assert_eq!(host.responses[0].status, 403);
    assert_eq!(host.responses[0].body, "Missing key in JSON payload.");
    assert!(host.calls.is_empty());
    assert!(!f.is_tracking(3));
}

#[test]
fn valid_payload_dispatches_one_call_and_suspends() {
    let (f, metrics) = filter(r#"{"requiredKeys": ["ids", "documents"]}"#);
    let body =
        br#"{"ids": ["a", "b"], "documents": ["ab", "abcd"], "embeddings": [[1,2,3],[4,5]]}"#;
    let mut host = MockHost::new().with_request(9, JSON, body);

    assert_eq!(deliver(&f, &mut host, 9), Action::Pause);
    assert!(host.responses.is_empty());
    assert!(host.resumes.is_empty());
    assert!(f.is_tracking(9));
    assert_eq!(metrics.policy_calls.get(&[("result", "dispatched")]), 1);

    assert_eq!(host.calls.len(), 1);
    let (id, _, call) = host.last_call();
    assert_eq!(*id, 9);
    assert_eq!(call.upstream, "opa_service");
    assert_eq!(call.method(), Some("POST"));
    assert_eq!(call.path(), Some("/v1/data/chroma_quotas/validate"));
    assert_eq!(call.header("accept"), Some("*/*"));
    assert_eq!(call.header("content-type"), Some("application/json"));
    assert_eq!(call.timeout, Duration::from_millis(2000));

    let sent: serde_json::Value = serde_json::from_slice(&call.body).unwrap();
    assert_eq!(
        sent,
        serde_json::json!({"input": {"document_lengths": [2, 4], "embeddings_dimensions": [3, 2]}})
    );
}

#[test]
fn allow_verdict_resumes_exactly_once() {
    let (f, metrics) = filter("");
    let mut host = MockHost::new().with_request(1, JSON, b"{}");
    deliver(&f, &mut host, 1);
    let token = host.last_call().1;
    host.set_reply(token, ALLOW);

    f.on_call_response(&mut host, token, 3, ALLOW.len(), 0);
    assert_eq!(host.resumes_for(1), 1);
    assert!(host.responses.is_empty());
    assert!(!f.is_tracking(1));

    // A duplicate callback must not produce a second terminal action.
    f.on_call_response(&mut host, token, 3, ALLOW.len(), 0);
    assert_eq!(host.resumes_for(1), 1);
    assert!(host.responses.is_empty());
    assert_eq!(metrics.decisions.get(&[("outcome", "resumed")]), 1);
    assert_eq!(metrics.policy_call_duration.count(&[]), 1);
}

#[test]
fn deny_verdict_sends_429_exactly_once() {
    let (f, _) = filter("");
    let mut host = MockHost::new().with_request(1, JSON, b"{}");
    deliver(&f, &mut host, 1);
    let token = host.last_call().1;
    host.set_reply(token, DENY);

    f.on_call_response(&mut host, token, 3, DENY.len(), 0);
    f.on_call_response(&mut host, token, 3, DENY.len(), 0);

    assert_eq!(host.resumes_for(1), 0);
    let responses = host.responses_for(1);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, 429);
    assert_eq!(responses[0].body, "Quota exceeded");
}

#[test]
fn unexpected_reply_shape_is_a_denial() {
    let (f, _) = filter("");
    let mut host = MockHost::new().with_request(1, JSON, b"{}");
    deliver(&f, &mut host, 1);
    let token = host.last_call().1;
    let reply = br#"{"result": {"allow": "yes"}}"#;
    host.set_reply(token, reply);

    f.on_call_response(&mut host, token, 1, reply.len(), 0);
    assert_eq!(host.responses[0].status, 429);
    assert_eq!(host.resumes_for(1), 0);
}

#[test]
fn unreadable_reply_fails_closed_by_default() {
    let (f, metrics) = filter("");
    let mut host = MockHost::new().with_request(1, JSON, b"{}");
    deliver(&f, &mut host, 1);
    let token = host.last_call().1;

    // Timeout or connection failure: no reply body available.
    f.on_call_response(&mut host, token, 0, 0, 0);
    assert_eq!(host.responses.len(), 1);
    assert_eq!(host.responses[0].status, 503);
    assert_eq!(host.resumes_for(1), 0);
    assert!(!f.is_tracking(1));
    assert_eq!(metrics.policy_calls.get(&[("result", "failed")]), 1);
}

#[test]
fn unreadable_reply_passes_through_when_allowed() {
    let (f, metrics) = filter(r#"{"failureMode": {"policyUnavailable": "allow"}}"#);
    let mut host = MockHost::new().with_request(1, JSON, b"{}");
    deliver(&f, &mut host, 1);
    let token = host.last_call().1;

    f.on_call_response(&mut host, token, 0, 0, 0);
    assert_eq!(host.resumes_for(1), 1);
    assert!(host.responses.is_empty());
    assert_eq!(metrics.decisions.get(&[("outcome", "passed_through")]), 1);
}

#[test]
fn dispatch_failure_rejects_without_waiting() {
    let (f, metrics) = filter("");
    let mut host = MockHost::new().with_request(1, JSON, b"{}");
    host.fail_dispatch = true;

    assert_eq!(deliver(&f, &mut host, 1), Action::Pause);
    assert_eq!(host.responses[0].status, 403);
    assert_eq!(host.responses[0].body, "Authorization failed.");
    assert!(!f.is_tracking(1));
    assert_eq!(f.in_flight(), 0);
    assert_eq!(metrics.policy_calls.get(&[("result", "dispatch_failed")]), 1);
}

#[test]
fn failed_local_response_lets_request_continue() {
    let (f, _) = filter("");
    let mut host = MockHost::new().with_request(1, Some("text/plain"), b"");
    host.fail_send = true;

    assert_eq!(f.on_request_headers(&mut host, 1), Action::Continue);
    assert!(!f.is_tracking(1));
}

#[test]
fn body_after_end_of_stream_is_refused() {
    let (f, _) = filter("");
    let mut host = MockHost::new().with_request(1, JSON, b"{}");
    deliver(&f, &mut host, 1);

    assert_eq!(f.on_request_body(&mut host, 1, 5, true), Action::Pause);
    assert_eq!(host.pulls().len(), 1);
    assert_eq!(host.calls.len(), 1);

    // Still waiting on the first call.
    let token = host.last_call().1;
    host.set_reply(token, ALLOW);
    f.on_call_response(&mut host, token, 1, ALLOW.len(), 0);
    assert_eq!(host.resumes_for(1), 1);
}

#[test]
fn body_limit_rejects_oversized_requests() {
    let (f, _) = filter(r#"{"maxBodyBytes": 16}"#);
    let mut host = MockHost::new().with_request(1, JSON, &[b' '; 32]);

    assert_eq!(f.on_request_headers(&mut host, 1), Action::Continue);
    assert_eq!(f.on_request_body(&mut host, 1, 16, false), Action::Pause);
    assert_eq!(f.on_request_body(&mut host, 1, 1, false), Action::Pause);
    assert_eq!(host.responses[0].status, 413);
    assert!(!f.is_tracking(1));
    assert!(host.pulls().is_empty());
}

#[test]
fn request_done_releases_suspended_state() {
    let (f, _) = filter("");
    let mut host = MockHost::new().with_request(1, JSON, b"{}");
    deliver(&f, &mut host, 1);
    let token = host.last_call().1;
    assert_eq!(f.in_flight(), 1);

    f.on_request_done(1);
    assert_eq!(f.in_flight(), 0);

    host.set_reply(token, ALLOW);
    f.on_call_response(&mut host, token, 1, ALLOW.len(), 0);
    assert!(host.resumes.is_empty());
    assert!(host.responses.is_empty());
}

#[test]
fn unknown_callback_is_ignored() {
    let (f, _) = filter("");
    let mut host = MockHost::new();
    f.on_call_response(&mut host, CallToken(99), 1, 0, 0);
    assert!(host.resumes.is_empty());
    assert!(host.responses.is_empty());
}

#[test]
fn interleaved_requests_keep_separate_state() {
    let (f, _) = filter(r#"{"requiredKeys": ["ids"]}"#);
    let mut host = MockHost::new()
        .with_request(1, JSON, br#"{"ids": [1]}"#)
        .with_request(2, JSON, br#"{"ids": [2, 3]}"#);

    assert_eq!(f.on_request_headers(&mut host, 1), Action::Continue);
    assert_eq!(f.on_request_headers(&mut host, 2), Action::Continue);
    assert_eq!(f.on_request_body(&mut host, 2, 5, false), Action::Pause);
    assert_eq!(f.on_request_body(&mut host, 1, 12, true), Action::Pause);
    assert_eq!(f.on_request_body(&mut host, 2, 10, true), Action::Pause);
    assert_eq!(host.pulls(), vec![(1, 0, 12), (2, 0, 15)]);

    let t1 = host.calls[0].1;
    let t2 = host.calls[1].1;
    host.set_reply(t1, DENY);
    host.set_reply(t2, ALLOW);

    f.on_call_response(&mut host, t2, 1, ALLOW.len(), 0);
    f.on_call_response(&mut host, t1, 1, DENY.len(), 0);

    assert_eq!(host.resumes, vec![2]);
    assert_eq!(host.responses.len(), 1);
    assert_eq!(host.responses[0].id, 1);
    assert_eq!(host.responses[0].status, 429);
    assert_eq!(f.in_flight(), 0);
}

#[test]
fn completion_before_dispatch_returns_still_finishes_request() {
    let (f, metrics) = filter("");
    let f = Arc::new(f);
    let mut host = MockHost::new().with_request(1, JSON, b"{}");
    host.complete_inline = Some((Arc::clone(&f), 0));

    assert_eq!(deliver(&f, &mut host, 1), Action::Pause);
    let responses = host.responses_for(1);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, 503);
    assert_eq!(host.resumes_for(1), 0);
    assert!(!f.is_tracking(1));
    assert_eq!(f.in_flight(), 0);
    assert_eq!(metrics.policy_calls.get(&[("result", "failed")]), 1);
}

#[test]
fn early_allow_reply_is_replayed_once() {
    let (f, _) = filter("");
    let f = Arc::new(f);
    let mut host = MockHost::new().with_request(1, JSON, b"{}");
    // Tokens are handed out from 1.
    host.set_reply(CallToken(1), ALLOW);
    host.complete_inline = Some((Arc::clone(&f), ALLOW.len()));

    assert_eq!(deliver(&f, &mut host, 1), Action::Pause);
    assert_eq!(host.last_call().1, CallToken(1));
    assert_eq!(host.resumes_for(1), 1);
    assert!(host.responses.is_empty());

    f.on_call_response(&mut host, CallToken(1), 1, ALLOW.len(), 0);
    assert_eq!(host.resumes_for(1), 1);
    assert!(host.responses.is_empty());
}

#[test]
fn repeated_headers_count_one_request() {
    let (f, metrics) = filter("");
    let mut host = MockHost::new().with_request(1, JSON, b"{}");

    assert_eq!(f.on_request_headers(&mut host, 1), Action::Continue);
    assert_eq!(f.on_request_headers(&mut host, 1), Action::Continue);
    assert_eq!(metrics.requests.get(&[]), 1);
    assert!(f.is_tracking(1));
}
