use std::time::Duration;

/// Capped exponential reconnect schedule without jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    base: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            attempts: 0,
        }
    }

    /// Counts one more attempt and returns how long to wait before it, or
    /// `None` once the cap is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        let factor = 1u32.checked_shl(self.attempts - 1).unwrap_or(u32::MAX);
        Some(self.base.saturating_mul(factor))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_the_cap() {
        let base = Duration::from_millis(3000);
        let mut policy = ReconnectPolicy::new(base, 5);
        let delays: Vec<_> = std::iter::from_fn(|| policy.next_delay()).collect();
        assert_eq!(
            delays,
            vec![base, base * 2, base * 4, base * 8, base * 16]
        );
        assert!(policy.exhausted());
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.attempts(), 5);
    }

    #[test]
    fn reset_restarts_the_schedule() {
        let base = Duration::from_millis(10);
        let mut policy = ReconnectPolicy::new(base, 2);
        policy.next_delay();
        policy.next_delay();
        assert_eq!(policy.next_delay(), None);
        policy.reset();
        assert_eq!(policy.next_delay(), Some(base));
    }

    #[test]
    fn zero_cap_never_reconnects() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(1), 0);
        assert_eq!(policy.next_delay(), None);
    }
}
