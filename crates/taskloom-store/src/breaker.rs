use std::time::{Duration, Instant};

/// Breaker tunables.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time spent open before a single probe is admitted.
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Three-state circuit breaker guarding the external store.
///
/// Pure state machine over an injected clock: callers pass `Instant::now()`
/// in production and synthetic instants in tests. Not internally
/// synchronised; wrap in a mutex when shared.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: State,
}

#[derive(Debug)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    /// One probe is in flight; everyone else is rejected.
    HalfOpen,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: State::Closed {
                consecutive_failures: 0,
            },
        }
    }

    pub fn state(&self) -> BreakerState {
        match self.state {
            State::Closed { .. } => BreakerState::Closed,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen => BreakerState::HalfOpen,
        }
    }

    /// Non-mutating admission check: would a call placed at `now` be
    /// allowed? Used for back-pressure refusal without consuming the
    /// half-open probe slot.
    pub fn would_admit(&self, now: Instant) -> bool {
        match self.state {
            State::Closed { .. } => true,
            State::HalfOpen => false,
            State::Open { since } => now.duration_since(since) >= self.config.open_timeout,
        }
    }

    /// Ask permission to place a call. `true` admits the call; the caller
    /// must then report `on_success`/`on_failure` exactly once.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.state {
            State::Closed { .. } => true,
            State::Open { since } => {
                if now.duration_since(since) >= self.config.open_timeout {
                    self.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
            State::HalfOpen => false,
        }
    }

    pub fn on_success(&mut self) {
        self.state = State::Closed {
            consecutive_failures: 0,
        };
    }

    pub fn on_failure(&mut self, now: Instant) {
        match &mut self.state {
            State::Closed {
                consecutive_failures,
            } => {
                *consecutive_failures += 1;
                if *consecutive_failures >= self.config.failure_threshold {
                    self.state = State::Open { since: now };
                }
            }
            // Probe failed: back to open with a fresh timer
            State::HalfOpen => {
                self.state = State::Open { since: now };
            }
            State::Open { .. } => {}
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            open_timeout: Duration::from_secs(30),
        })
    }

    #[test]
    fn three_failures_open_the_circuit() {
        let mut b = breaker();
        let t0 = Instant::now();

        for _ in 0..2 {
            assert!(b.try_acquire(t0));
            b.on_failure(t0);
            assert_eq!(b.state(), BreakerState::Closed);
        }
        assert!(b.try_acquire(t0));
        b.on_failure(t0);
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.try_acquire(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn open_admits_one_probe_after_timeout() {
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.try_acquire(t0);
            b.on_failure(t0);
        }

        let probe_time = t0 + Duration::from_secs(30);
        assert!(b.try_acquire(probe_time));
        assert_eq!(b.state(), BreakerState::HalfOpen);
        // Concurrent callers are rejected while the probe runs
        assert!(!b.try_acquire(probe_time));

        b.on_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire(probe_time));
    }

    #[test]
    fn failed_probe_reopens_with_fresh_timer() {
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.try_acquire(t0);
            b.on_failure(t0);
        }

        let probe_time = t0 + Duration::from_secs(30);
        assert!(b.try_acquire(probe_time));
        b.on_failure(probe_time);
        assert_eq!(b.state(), BreakerState::Open);

        // The timer restarted at probe_time, not t0
        assert!(!b.try_acquire(probe_time + Duration::from_secs(29)));
        assert!(b.try_acquire(probe_time + Duration::from_secs(30)));
    }

    #[test]
    fn success_resets_the_failure_count() {
        let mut b = breaker();
        let t0 = Instant::now();
        b.on_failure(t0);
        b.on_failure(t0);
        b.on_success();
        b.on_failure(t0);
        b.on_failure(t0);
        assert_eq!(b.state(), BreakerState::Closed);
    }
}
