//! Client configuration.

use std::time::Duration;

/// Tuning for the admin client and its dispatcher loop.
#[derive(Clone, Debug)]
pub struct AdminClientConfig {
    /// Client id used in logs. Empty picks a generated unique id.
    pub client_id: String,
    /// Default per-call timeout; overridable per operation.
    pub request_timeout: Duration,
    /// Retriable failures tolerated per call before RetriesExhausted.
    pub max_retries: u32,
    /// Wait before re-dispatching a call after a retriable failure.
    pub retry_backoff: Duration,
    /// Upper bound for one transport poll; also the idle tick interval.
    pub poll_interval: Duration,
}

impl Default for AdminClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            request_timeout: Duration::from_secs(30),
            max_retries: 5,
            retry_backoff: Duration::from_millis(100),
            poll_interval: Duration::from_millis(100),
        }
    }
}
