//! Reconnect backoff
//!
//! Exponential schedule starting at 500 ms and doubling to a 30 s ceiling.
//! The jittered delay is drawn from [base/2, base] so that a burst of
//! disconnected connectors does not reconnect in lockstep.

use std::time::Duration;

use rand::Rng;

const INITIAL: Duration = Duration::from_millis(500);
const CEILING: Duration = Duration::from_secs(30);

/// Exponential backoff with full reset on recovery
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self { current: INITIAL }
    }

    /// Base delay for the next attempt; doubles up to the ceiling
    pub fn next_base(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(CEILING);
        base
    }

    /// Jittered delay for the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next_base();
        let half = base / 2;
        half + rand::thread_rng().gen_range(Duration::ZERO..=half)
    }

    /// Call after a successful recovery
    pub fn reset(&mut self) {
        self.current = INITIAL;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_schedule() {
        let mut backoff = Backoff::new();
        assert_eq!(backoff.next_base(), Duration::from_millis(500));
        assert_eq!(backoff.next_base(), Duration::from_secs(1));
        assert_eq!(backoff.next_base(), Duration::from_secs(2));
        assert_eq!(backoff.next_base(), Duration::from_secs(4));
    }

    #[test]
    fn test_ceiling() {
        let mut backoff = Backoff::new();
        for _ in 0..20 {
            backoff.next_base();
        }
        assert_eq!(backoff.next_base(), Duration::from_secs(30));
        assert_eq!(backoff.next_base(), Duration::from_secs(30));
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new();
        backoff.next_base();
        backoff.next_base();
        backoff.reset();
        assert_eq!(backoff.next_base(), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_bounds() {
        let mut backoff = Backoff::new();
        for _ in 0..8 {
            let mut probe = backoff.clone();
            let base = backoff.next_base();
            let delay = probe.next_delay();
            assert!(delay >= base / 2, "{delay:?} below half of {base:?}");
            assert!(delay <= base, "{delay:?} above {base:?}");
        }
    }
}
