//! Exponential backoff for reconnect attempts.
//!
//! Every dropped connection waits before the next dial, and the wait
//! doubles up to a ceiling. A successful session resets the ladder.

use std::time::Duration;

use crate::{RECONNECT_INITIAL_DELAY, RECONNECT_MAX_DELAY};

/// Doubling delay ladder for reconnects.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl ReconnectBackoff {
    /// Creates a ladder from `initial` doubling up to `max`.
    #[must_use]
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// The delay to wait before the next attempt. Doubles the ladder.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    /// Returns the ladder to its first rung.
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(RECONNECT_INITIAL_DELAY, RECONNECT_MAX_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double_to_ceiling() {
        let mut backoff =
            ReconnectBackoff::new(Duration::from_millis(250), Duration::from_secs(8));
        assert_eq!(backoff.next_delay(), Duration::from_millis(250));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        for _ in 0..10 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
    }

    #[test]
    fn test_reset_returns_to_first_rung() {
        let mut backoff = ReconnectBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), RECONNECT_INITIAL_DELAY);
    }
}
