//! Circuit breaker for the generation API
//!
//! Each generator owns its own breaker, so one misbehaving credential or
//! endpoint cannot block unrelated generators in the same process.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests allowed
    Closed,
    /// Too many consecutive failures; requests rejected until the cooldown ends
    Open,
    /// Cooldown elapsed; the next request probes recovery
    HalfOpen,
}

/// Consecutive-failure circuit breaker
///
/// # Example
///
/// ```
/// use hive_agent::CircuitBreaker;
/// use std::time::Duration;
///
/// let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
/// breaker.record_failure();
/// breaker.record_failure();
/// assert!(!breaker.can_execute());
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    failures: AtomicU32,
    /// Millis since `epoch` of the most recent failure
    last_failure_ms: AtomicU64,
    epoch: Instant,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            last_failure_ms: AtomicU64::new(0),
            epoch: Instant::now(),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn since_last_failure(&self) -> Duration {
        let last = self.last_failure_ms.load(Ordering::Relaxed);
        Duration::from_millis(self.now_ms().saturating_sub(last))
    }

    pub fn state(&self) -> CircuitState {
        if self.failures.load(Ordering::Relaxed) < self.threshold {
            CircuitState::Closed
        } else if self.since_last_failure() >= self.cooldown {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.last_failure_ms.store(self.now_ms(), Ordering::Relaxed);
    }

    pub fn can_execute(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Time left before a probe is allowed; zero unless open
    pub fn time_until_retry(&self) -> Duration {
        match self.state() {
            CircuitState::Open => self.cooldown.saturating_sub(self.since_last_failure()),
            _ => Duration::ZERO,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_starts_closed() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
        assert_eq!(breaker.time_until_retry(), Duration::ZERO);
    }

    #[test]
    fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
        assert!(breaker.time_until_retry() > Duration::ZERO);
    }

    #[test]
    fn test_success_closes() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(50));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        sleep(Duration::from_millis(80));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_breakers_are_independent() {
        let a = CircuitBreaker::new(1, Duration::from_secs(60));
        let b = CircuitBreaker::new(1, Duration::from_secs(60));
        a.record_failure();
        assert!(!a.can_execute());
        assert!(b.can_execute());
    }
}
