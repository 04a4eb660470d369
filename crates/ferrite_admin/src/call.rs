//! One outstanding administrative request and its lifecycle state.
//!
//! A call pairs an opaque request builder with a response strategy. The
//! dispatcher drives the state machine; the strategy decides completion,
//! retry, or failure and resolves the caller's completion handles. Terminal
//! transitions consume the call, so a completed or failed call can never be
//! revisited.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::cluster::NodeId;
use crate::deadline::Deadline;
use crate::error::AdminError;

/// Process-unique call identity, used for logging only.
pub type CallId = u64;

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// How the destination node for a call is chosen (and re-chosen on retry).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetPolicy {
    /// Always this node; fails NodeNotFound if the view does not know it.
    FixedNode(NodeId),
    /// Any reachable node; used for operations without node affinity.
    AnyBootstrapNode,
    /// The cluster's elected controller; waits while the controller is
    /// unknown rather than failing.
    ClusterController,
}

/// Lifecycle states. `Completed` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    Created,
    AwaitingNode,
    Sent,
    Completed,
    Failed,
}

/// Decision returned by a call's response strategy.
pub enum CallDecision {
    /// The strategy resolved its handles; the call is done.
    Complete,
    /// Retriable condition; the dispatcher re-targets and re-sends. Carries
    /// the retriable error so retry exhaustion can report the last cause.
    Retry(AdminError),
    /// Terminal failure; the dispatcher fails the call with this error.
    Fail(AdminError),
}

type RequestFn = Box<dyn FnMut(i32) -> anyhow::Result<Bytes> + Send>;
type ResponseFn = Box<dyn FnMut(&Bytes) -> CallDecision + Send>;
type FailureFn = Box<dyn FnOnce(AdminError) + Send>;

pub struct Call {
    id: CallId,
    api: &'static str,
    target: TargetPolicy,
    timeout: Duration,
    created_at: Instant,
    deadline: Deadline,
    attempt: u32,
    state: CallState,
    /// Earliest instant a retried call may be re-sent.
    ready_at: Option<Instant>,
    request: RequestFn,
    on_response: ResponseFn,
    on_failure: Option<FailureFn>,
}

impl Call {
    /// New call in `Created`, deadline fixed at now + `timeout`.
    ///
    /// `request` builds the encoded payload for each attempt and receives
    /// the saturated remaining time in milliseconds. `on_response` is
    /// invoked with each decoded-on-the-wire response payload and must
    /// resolve the caller's handles before returning `Complete`; it must
    /// leave them untouched when returning `Retry` or `Fail`. `on_failure`
    /// runs exactly once on the terminal failure path and resolves the
    /// handles with the error.
    pub fn new(
        api: &'static str,
        target: TargetPolicy,
        timeout: Duration,
        request: impl FnMut(i32) -> anyhow::Result<Bytes> + Send + 'static,
        on_response: impl FnMut(&Bytes) -> CallDecision + Send + 'static,
        on_failure: impl FnOnce(AdminError) + Send + 'static,
    ) -> Self {
        Self {
            id: NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed),
            api,
            target,
            timeout,
            created_at: Instant::now(),
            deadline: Deadline::after(timeout),
            attempt: 0,
            state: CallState::Created,
            ready_at: None,
            request: Box::new(request),
            on_response: Box::new(on_response),
            on_failure: Some(Box::new(on_failure)),
        }
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn api(&self) -> &'static str {
        self.api
    }

    pub fn target(&self) -> TargetPolicy {
        self.target
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub(crate) fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Whether a retried call has served out its backoff.
    pub(crate) fn retry_ready(&self, now: Instant) -> bool {
        self.ready_at.map_or(true, |at| at <= now)
    }

    pub(crate) fn ready_at(&self) -> Option<Instant> {
        self.ready_at
    }

    pub(crate) fn mark_awaiting_node(&mut self) {
        debug_assert!(matches!(
            self.state,
            CallState::Created | CallState::AwaitingNode | CallState::Sent
        ));
        self.state = CallState::AwaitingNode;
    }

    pub(crate) fn mark_sent(&mut self) {
        debug_assert_eq!(CallState::AwaitingNode, self.state);
        self.state = CallState::Sent;
        self.ready_at = None;
    }

    /// Record a retriable failure: bump the attempt counter and gate the
    /// next send behind the backoff.
    pub(crate) fn record_retry(&mut self, backoff: Duration, now: Instant) {
        self.attempt += 1;
        self.ready_at = Some(now + backoff);
        self.mark_awaiting_node();
    }

    /// Build the encoded request for the current attempt.
    pub(crate) fn encode_request(&mut self, now: Instant) -> anyhow::Result<Bytes> {
        let remaining_ms = self.deadline.remaining_ms_hint(now);
        (self.request)(remaining_ms)
    }

    /// Hand a response payload to the strategy.
    pub(crate) fn handle_response(&mut self, payload: &Bytes) -> CallDecision {
        (self.on_response)(payload)
    }

    /// Terminal success. The strategy already resolved the handles.
    pub(crate) fn complete(mut self) {
        debug_assert!(!self.is_terminal());
        self.state = CallState::Completed;
        tracing::debug!(call = self.id, api = self.api, attempt = self.attempt, "call completed");
    }

    /// Terminal failure: resolves the caller's handles with `error`.
    pub(crate) fn fail(mut self, error: AdminError) {
        debug_assert!(!self.is_terminal());
        self.state = CallState::Failed;
        tracing::debug!(
            call = self.id,
            api = self.api,
            attempt = self.attempt,
            error = %error,
            "call failed"
        );
        if let Some(on_failure) = self.on_failure.take() {
            on_failure(error);
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self.state, CallState::Completed | CallState::Failed)
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.id)
            .field("api", &self.api)
            .field("target", &self.target)
            .field("state", &self.state)
            .field("attempt", &self.attempt)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn noop_call(target: TargetPolicy, failures: Arc<AtomicUsize>) -> Call {
        Call::new(
            "test_op",
            target,
            Duration::from_secs(5),
            |_timeout_ms| Ok(Bytes::new()),
            |_payload| CallDecision::Complete,
            move |_err| {
                failures.fetch_add(1, Ordering::SeqCst);
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ids_are_unique_and_state_advances() {
        let failures = Arc::new(AtomicUsize::new(0));
        let mut a = noop_call(TargetPolicy::ClusterController, failures.clone());
        let b = noop_call(TargetPolicy::AnyBootstrapNode, failures.clone());
        assert_ne!(a.id(), b.id());
        assert_eq!(CallState::Created, a.state());

        a.mark_awaiting_node();
        assert_eq!(CallState::AwaitingNode, a.state());
        a.mark_sent();
        assert_eq!(CallState::Sent, a.state());

        a.record_retry(Duration::from_millis(50), Instant::now());
        assert_eq!(CallState::AwaitingNode, a.state());
        assert_eq!(1, a.attempt());
        assert!(!a.retry_ready(Instant::now()));
        assert!(a.retry_ready(Instant::now() + Duration::from_millis(50)));

        b.fail(AdminError::ClientClosed);
        assert_eq!(1, failures.load(Ordering::SeqCst));
    }
}
