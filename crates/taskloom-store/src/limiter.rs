use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Serialised FIFO rate limiter: at most one call per `interval`.
///
/// Acquisition order is the mutex queue order; a cancelled waiter
/// releases its slot by never advancing the shared deadline.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_allowed: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_allowed: Mutex::new(Instant::now()),
        }
    }

    /// Default minimum inter-call interval: 100 ms (≤ 10 calls/s).
    pub fn default_interval() -> Self {
        Self::new(Duration::from_millis(100))
    }

    /// Wait for the next slot. Returns once the caller may place its call.
    pub async fn acquire(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            let wait = *next - now;
            tokio::time::sleep(wait).await;
        }
        *next = Instant::now().max(*next) + self.interval;
    }
}

/// Sliding-window operation budget: at most `max_ops` within `window`.
///
/// Used in front of uncached embedding calls; when the window is full the
/// caller sleeps until the oldest operation ages out.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    max_ops: usize,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_ops: usize, window: Duration) -> Self {
        Self {
            window,
            max_ops,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Default budget: 100 operations per minute.
    pub fn default_budget() -> Self {
        Self::new(100, Duration::from_secs(60))
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut stamps = self.timestamps.lock().await;
                let now = Instant::now();
                while let Some(front) = stamps.front() {
                    if now.duration_since(*front) >= self.window {
                        stamps.pop_front();
                    } else {
                        break;
                    }
                }
                if stamps.len() < self.max_ops {
                    stamps.push_back(now);
                    None
                } else {
                    // Sleep until the oldest entry leaves the window
                    Some(self.window - now.duration_since(*stamps.front().expect("non-empty")))
                }
            };

            match wait {
                None => return,
                Some(delay) => tokio::time::sleep(delay).await,
            }
        }
    }

    /// Operations currently inside the window (for diagnostics).
    pub async fn in_flight(&self) -> usize {
        let mut stamps = self.timestamps.lock().await;
        let now = Instant::now();
        while let Some(front) = stamps.front() {
            if now.duration_since(*front) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }
        stamps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_spaces_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(20));
        let started = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        // First call is free; two more cost one interval each
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn window_admits_up_to_budget_immediately() {
        let limiter = SlidingWindowLimiter::new(5, Duration::from_secs(60));
        let started = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(limiter.in_flight().await, 5);
    }

    #[tokio::test]
    async fn window_blocks_when_full() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_millis(80));
        limiter.acquire().await;
        limiter.acquire().await;

        let started = Instant::now();
        limiter.acquire().await;
        // Had to wait for the first slot to age out
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
