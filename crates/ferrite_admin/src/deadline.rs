//! Call deadlines and remaining-time arithmetic.
//!
//! A deadline is fixed when a call is created and never extended. The
//! saturating millisecond conversion exists because requests carry their
//! remaining budget to the server as a 32-bit field.

use std::time::Duration;

use tokio::time::Instant;

/// Absolute expiry point for a call, measured on the monotonic clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    /// Deadline at an explicit instant.
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    /// True once `now` has reached the deadline.
    pub fn expired(&self, now: Instant) -> bool {
        self.0 <= now
    }

    /// Time left before expiry, zero once past.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.0.duration_since(now)
    }

    /// Remaining budget as a saturated 32-bit millisecond hint for servers.
    pub fn remaining_ms_hint(&self, now: Instant) -> i32 {
        self.remaining(now)
            .as_millis()
            .min(i32::MAX as u128) as i32
    }
}

/// Remaining time between two 64-bit millisecond timestamps, clamped into the
/// 32-bit signed range. A remaining duration past either bound saturates
/// instead of wrapping.
pub fn remaining_timeout_ms(deadline_ms: i64, now_ms: i64) -> i32 {
    deadline_ms
        .saturating_sub(now_ms)
        .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_timeout_saturates_at_both_bounds() {
        assert_eq!(0, remaining_timeout_ms(1000, 1000));
        assert_eq!(100, remaining_timeout_ms(1100, 1000));
        assert_eq!(-100, remaining_timeout_ms(1000, 1100));
        assert_eq!(i32::MAX, remaining_timeout_ms(i64::MAX, 0));
        assert_eq!(i32::MIN, remaining_timeout_ms(0, i64::MAX));
        assert_eq!(i32::MAX, remaining_timeout_ms(i64::MAX, i64::MIN));
        assert_eq!(i32::MIN, remaining_timeout_ms(i64::MIN, i64::MAX));
    }

    #[test]
    fn remaining_timeout_exact_boundaries() {
        assert_eq!(i32::MAX, remaining_timeout_ms(i64::from(i32::MAX), 0));
        assert_eq!(i32::MIN, remaining_timeout_ms(i64::from(i32::MIN), 0));
        // One past each bound still reports the bound.
        assert_eq!(i32::MAX, remaining_timeout_ms(i64::from(i32::MAX) + 1, 0));
        assert_eq!(i32::MIN, remaining_timeout_ms(i64::from(i32::MIN) - 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_and_remaining() {
        let now = Instant::now();
        let deadline = Deadline::at(now + Duration::from_millis(250));
        assert!(!deadline.expired(now));
        assert_eq!(Duration::from_millis(250), deadline.remaining(now));
        assert_eq!(250, deadline.remaining_ms_hint(now));

        let later = now + Duration::from_millis(250);
        assert!(deadline.expired(later));
        assert_eq!(Duration::ZERO, deadline.remaining(later));
        assert_eq!(0, deadline.remaining_ms_hint(later));
    }
}
