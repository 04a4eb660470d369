//! Client shutdown: every outstanding call resolves exactly once with
//! ClientClosed, and close never hangs.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use ferrite_admin::{AdminClientConfig, AdminOptions, AdminError, NewTopic};

#[tokio::test(start_paused = true)]
async fn close_resolves_every_outstanding_call_exactly_once() {
    let env = mock_env(fast_config());

    // Three calls that will never be answered.
    let topics = env.client.create_topics(
        vec![NewTopic::new("a", 1, 1), NewTopic::new("b", 1, 1)],
        &AdminOptions::new(),
    );
    let acls = env.client.describe_acls(filter1(), &AdminOptions::new());

    // Let the dispatcher take them in flight before closing.
    while env.transport.unanswered_requests().len() < 3 {
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }

    let resolutions = Arc::new(AtomicUsize::new(0));
    for handle in [
        topics.topic("a").unwrap().clone(),
        topics.topic("b").unwrap().clone(),
    ] {
        let resolutions = resolutions.clone();
        handle.when_complete(move |result| {
            assert_eq!(Err(AdminError::ClientClosed), *result);
            resolutions.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let resolutions = resolutions.clone();
        acls.bindings().when_complete(move |result| {
            assert!(matches!(result, Err(AdminError::ClientClosed)));
            resolutions.fetch_add(1, Ordering::SeqCst);
        });
    }

    env.client.close().await;
    assert_eq!(3, resolutions.load(Ordering::SeqCst));
    assert_eq!(Err(AdminError::ClientClosed), topics.all().get().await);
    assert_eq!(
        Err(AdminError::ClientClosed),
        topics.topic("a").unwrap().get().await
    );
}

#[tokio::test(start_paused = true)]
async fn close_resolves_calls_still_awaiting_dispatch() {
    let env = mock_env(fast_config());
    // No controller: the call never leaves the unassigned bucket.
    env.view.set_controller(None);

    let result = env
        .client
        .create_topics(vec![NewTopic::new("stuck", 1, 1)], &AdminOptions::new());
    env.client.close().await;
    assert_eq!(Err(AdminError::ClientClosed), result.all().get().await);
}

#[tokio::test(start_paused = true)]
async fn close_is_idempotent_and_fails_later_submissions() {
    let env = mock_env(AdminClientConfig::default());
    env.client.close().await;
    env.client.close().await;

    let result = env
        .client
        .create_topics(vec![NewTopic::new("late", 1, 1)], &AdminOptions::new());
    assert_eq!(Err(AdminError::ClientClosed), result.all().get().await);
    assert_eq!(
        Err(AdminError::ClientClosed),
        result.topic("late").unwrap().get().await
    );
    assert!(env.transport.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn close_with_nothing_outstanding_returns() {
    let env = mock_env(AdminClientConfig::default());
    env.client.close().await;
}
