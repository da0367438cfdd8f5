use std::time::Duration;

/// Reconnect delays in milliseconds. The last entry repeats forever.
pub const DEFAULT_BACKOFF_MS: [u64; 5] = [1000, 2000, 4000, 8000, 16000];

/// Delay before reconnect attempt `attempt` (0-indexed), clamped to the last
/// entry of `schedule`. An empty schedule means "retry immediately".
pub fn backoff_delay(schedule: &[Duration], attempt: u32) -> Duration {
    let idx = (attempt as usize).min(schedule.len().saturating_sub(1));
    schedule.get(idx).copied().unwrap_or(Duration::ZERO)
}

/// Counts closures since the last successful open and hands out the
/// matching delays.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    schedule: Vec<Duration>,
    attempt: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_MS.iter().map(|ms| Duration::from_millis(*ms)).collect())
    }
}

impl ReconnectBackoff {
    pub fn new(schedule: Vec<Duration>) -> Self {
        Self { schedule, attempt: 0 }
    }

    /// Record a closure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = backoff_delay(&self.schedule, self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Call on every successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Closures since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn schedule(&self) -> &[Duration] {
        &self.schedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(d: Duration) -> u64 {
        d.as_millis() as u64
    }

    #[test]
    fn default_schedule_doubles_then_caps() {
        let mut backoff = ReconnectBackoff::default();
        let delays: Vec<u64> = (0..8).map(|_| ms(backoff.next_delay())).collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16000, 16000, 16000, 16000]
        );
        assert_eq!(backoff.attempt(), 8);
    }

    #[test]
    fn reset_restarts_from_first_delay() {
        let mut backoff = ReconnectBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(ms(backoff.next_delay()), 1000);
    }

    #[test]
    fn custom_schedule_is_respected() {
        let mut backoff =
            ReconnectBackoff::new(vec![Duration::from_millis(10), Duration::from_millis(30)]);
        assert_eq!(ms(backoff.next_delay()), 10);
        assert_eq!(ms(backoff.next_delay()), 30);
        assert_eq!(ms(backoff.next_delay()), 30);
    }

    #[test]
    fn empty_schedule_retries_immediately() {
        assert_eq!(backoff_delay(&[], 3), Duration::ZERO);
    }
}
