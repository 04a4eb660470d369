//! Fault-injected expiry decisions.
//!
//! The expiry policy is injected into the timeout processor factory, so a
//! test can force the Nth evaluated call to be treated as expired while
//! every other call is judged by its real deadline. Because evaluation
//! order is deterministic submission order, the injection lands on a known
//! call.

mod common;

use std::time::Duration;

use common::*;
use ferrite_admin::{
    AdminError, AdminOptions, AdminResponse, ApiError, Call, ExpiryPolicy, NewTopic,
    TimeoutProcessorFactory,
};
use tokio::time::Instant;

/// Forces the `inject_at`-th evaluation to report expiry; all other
/// evaluations use the real deadline.
struct FailureInjectingExpiry {
    evaluations: usize,
    inject_at: usize,
}

impl ExpiryPolicy for FailureInjectingExpiry {
    fn call_has_expired(&mut self, now: Instant, call: &Call) -> bool {
        self.evaluations += 1;
        if self.evaluations == self.inject_at {
            tracing::debug!(call = call.id(), "injecting timeout");
            return true;
        }
        call.deadline().expired(now)
    }
}

#[tokio::test(start_paused = true)]
async fn injected_expiry_hits_exactly_the_second_evaluated_call() {
    let factory = TimeoutProcessorFactory::with_policy(Box::new(FailureInjectingExpiry {
        evaluations: 0,
        inject_at: 2,
    }));
    let env = mock_env_with_factory(fast_config(), factory);

    // Three calls, none answered yet: all reach the in-flight set in
    // submission order before the first sweep.
    let result = env.client.create_topics(
        vec![
            NewTopic::new("first", 1, 1),
            NewTopic::new("second", 1, 1),
            NewTopic::new("third", 1, 1),
        ],
        &AdminOptions::new(),
    );

    // The second evaluated call times out despite a 60s deadline.
    let error = assert_err_kind(result.topic("second").unwrap(), "Timeout").await;
    match error {
        AdminError::Timeout { elapsed, permitted } => {
            assert_eq!(Duration::from_secs(60), permitted);
            assert!(elapsed < permitted, "injected expiry, not a real one");
        }
        other => panic!("unexpected error: {other}"),
    }

    // The others are still governed by their true deadlines and complete
    // once answered.
    assert!(env.transport.answer_next_unanswered(AdminResponse::CreateTopic {
        error: ApiError::ok(),
    }));
    assert!(env.transport.answer_next_unanswered(AdminResponse::CreateTopic {
        error: ApiError::ok(),
    }));
    assert_eq!(Ok(()), result.topic("first").unwrap().get().await);
    assert_eq!(Ok(()), result.topic("third").unwrap().get().await);

    assert_err_kind(result.all(), "Timeout").await;
    env.client.close().await;
}

#[tokio::test(start_paused = true)]
async fn real_deadlines_still_apply_with_injection_installed() {
    // Injection target far beyond the evaluations this test performs.
    let factory = TimeoutProcessorFactory::with_policy(Box::new(FailureInjectingExpiry {
        evaluations: 0,
        inject_at: usize::MAX,
    }));
    let env = mock_env_with_factory(fast_config(), factory);

    let result = env.client.create_topics(
        vec![NewTopic::new("slow", 1, 1)],
        &AdminOptions::new().timeout(Duration::from_millis(30)),
    );
    let error = assert_err_kind(result.all(), "Timeout").await;
    match error {
        AdminError::Timeout { elapsed, permitted } => {
            assert_eq!(Duration::from_millis(30), permitted);
            assert!(elapsed >= permitted);
        }
        other => panic!("unexpected error: {other}"),
    }
    env.client.close().await;
}
