//! Deadline enforcement for outstanding calls.
//!
//! A `TimeoutProcessor` is created once per dispatcher cycle with a
//! snapshot of the clock and evaluates every outstanding call in
//! deterministic submission order. The expiry decision is injectable so
//! tests can force a specific evaluation to expire without changing the
//! production order.

use tokio::time::Instant;

use crate::call::Call;
use crate::error::AdminError;
use crate::pending::PendingCallTable;

/// Per-call expiry decision.
///
/// The production policy compares the call's deadline against the sweep
/// snapshot. Test policies may force expiry for selected evaluations; the
/// processor asks in evaluation order, so a policy can count calls.
pub trait ExpiryPolicy: Send {
    fn call_has_expired(&mut self, now: Instant, call: &Call) -> bool;
}

/// Production policy: expired once the deadline has passed.
#[derive(Default)]
pub struct DeadlineExpiry;

impl ExpiryPolicy for DeadlineExpiry {
    fn call_has_expired(&mut self, now: Instant, call: &Call) -> bool {
        call.deadline().expired(now)
    }
}

/// Creates a `TimeoutProcessor` per sweep, carrying the policy across
/// sweeps so stateful test policies observe every evaluation.
pub struct TimeoutProcessorFactory {
    policy: Box<dyn ExpiryPolicy>,
}

impl Default for TimeoutProcessorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutProcessorFactory {
    pub fn new() -> Self {
        Self {
            policy: Box::new(DeadlineExpiry),
        }
    }

    pub fn with_policy(policy: Box<dyn ExpiryPolicy>) -> Self {
        Self { policy }
    }

    pub fn create(&mut self, now: Instant) -> TimeoutProcessor<'_> {
        TimeoutProcessor {
            now,
            policy: self.policy.as_mut(),
            expired: 0,
        }
    }
}

/// One sweep over the outstanding calls.
pub struct TimeoutProcessor<'a> {
    now: Instant,
    policy: &'a mut dyn ExpiryPolicy,
    expired: usize,
}

impl TimeoutProcessor<'_> {
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Ask the policy whether this call has expired. Counts as one
    /// evaluation for stateful policies.
    pub fn call_has_expired(&mut self, call: &Call) -> bool {
        self.policy.call_has_expired(self.now, call)
    }

    /// Sweep a pending table: fail every expired call with a timeout error
    /// and return how many expired.
    pub fn handle_timeouts(&mut self, table: &mut PendingCallTable, message: &str) -> usize {
        let expired = table.extract_expired(|call| self.policy.call_has_expired(self.now, call));
        let count = expired.len();
        for call in expired {
            self.fail_expired(call, message);
        }
        count
    }

    /// Fail one expired call with its elapsed/permitted diagnostics.
    pub fn fail_expired(&mut self, call: Call, message: &str) {
        let elapsed = self.now.duration_since(call.created_at());
        let permitted = call.timeout();
        tracing::debug!(
            call = call.id(),
            api = call.api(),
            elapsed_ms = elapsed.as_millis() as u64,
            permitted_ms = permitted.as_millis() as u64,
            message,
            "failing expired call"
        );
        call.fail(AdminError::Timeout { elapsed, permitted });
        self.expired += 1;
    }

    /// Number of calls failed by this sweep.
    pub fn expired(&self) -> usize {
        self.expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallDecision, TargetPolicy};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn call_with_timeout(timeout: Duration, failures: Arc<AtomicUsize>) -> Call {
        Call::new(
            "sweep_op",
            TargetPolicy::ClusterController,
            timeout,
            |_| Ok(Bytes::new()),
            |_| CallDecision::Complete,
            move |err| {
                assert!(matches!(err, AdminError::Timeout { .. }));
                failures.fetch_add(1, Ordering::SeqCst);
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_fails_only_expired_calls() {
        let failures = Arc::new(AtomicUsize::new(0));
        let mut table = PendingCallTable::new();
        table.push_unassigned(call_with_timeout(Duration::from_millis(10), failures.clone()));
        table.push_unassigned(call_with_timeout(Duration::from_secs(60), failures.clone()));

        tokio::time::advance(Duration::from_millis(20)).await;

        let mut factory = TimeoutProcessorFactory::new();
        let mut processor = factory.create(Instant::now());
        let count = processor.handle_timeouts(&mut table, "deadline elapsed in test");
        assert_eq!(1, count);
        assert_eq!(1, processor.expired());
        assert_eq!(1, failures.load(Ordering::SeqCst));
        assert_eq!(1, table.len());
    }

    struct ExpireNth {
        evaluations: usize,
        target: usize,
    }

    impl ExpiryPolicy for ExpireNth {
        fn call_has_expired(&mut self, now: Instant, call: &Call) -> bool {
            self.evaluations += 1;
            self.evaluations == self.target || call.deadline().expired(now)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn injected_policy_forces_selected_evaluation() {
        let failures = Arc::new(AtomicUsize::new(0));
        let mut table = PendingCallTable::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let call = call_with_timeout(Duration::from_secs(60), failures.clone());
            ids.push(call.id());
            table.push_unassigned(call);
        }

        let mut factory = TimeoutProcessorFactory::with_policy(Box::new(ExpireNth {
            evaluations: 0,
            target: 2,
        }));
        let mut processor = factory.create(Instant::now());
        let count = processor.handle_timeouts(&mut table, "injected expiry");
        assert_eq!(1, count);
        assert_eq!(1, failures.load(Ordering::SeqCst));

        // The survivors are the first and third submissions.
        let remaining: Vec<_> = table.iter().map(|c| c.id()).collect();
        assert_eq!(vec![ids[0], ids[2]], remaining);
    }
}
