use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Which of the two sliding windows refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Short,
    Long,
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Short => f.write_str("short-window"),
            Window::Long => f.write_str("long-window"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub short_limit: u32,
    pub short_window: Duration,
    pub long_limit: u32,
    pub long_window: Duration,
}

impl RateLimitConfig {
    pub fn per_minute_and_hour(short_limit: u32, long_limit: u32) -> Self {
        Self {
            short_limit,
            short_window: Duration::from_secs(60),
            long_limit,
            long_window: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub window: Window,
    pub retry_in: Duration,
}

#[derive(Debug)]
struct SlidingWindow {
    limit: u32,
    span: Duration,
    hits: VecDeque<Instant>,
}

impl SlidingWindow {
    fn new(limit: u32, span: Duration) -> Self {
        Self {
            limit,
            span,
            hits: VecDeque::new(),
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.hits.front() {
            if now.saturating_duration_since(*front) >= self.span {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until the oldest hit leaves the window, when the window is full.
    fn blocked_for(&mut self, now: Instant) -> Option<Duration> {
        self.evict(now);
        if (self.hits.len() as u32) < self.limit {
            return None;
        }
        let oldest = self.hits.front().copied().unwrap_or(now);
        Some(self.span.saturating_sub(now.saturating_duration_since(oldest)))
    }
}

/// Two independent sliding-window counters for one upstream source.
///
/// A limiter is owned by exactly one fetch client; nothing is global, so tests
/// and several sources can hold their own.
#[derive(Debug)]
pub struct RateLimiter {
    short: SlidingWindow,
    long: SlidingWindow,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            short: SlidingWindow::new(config.short_limit, config.short_window),
            long: SlidingWindow::new(config.long_limit, config.long_window),
        }
    }

    pub fn try_acquire(&mut self) -> Result<(), Rejection> {
        self.try_acquire_at(Instant::now())
    }

    /// Records a request at `now` unless either window is already full.
    /// A rejected call consumes nothing.
    pub fn try_acquire_at(&mut self, now: Instant) -> Result<(), Rejection> {
        if let Some(retry_in) = self.short.blocked_for(now) {
            return Err(Rejection {
                window: Window::Short,
                retry_in,
            });
        }
        if let Some(retry_in) = self.long.blocked_for(now) {
            return Err(Rejection {
                window: Window::Long,
                retry_in,
            });
        }
        self.short.hits.push_back(now);
        self.long.hits.push_back(now);
        Ok(())
    }

    pub fn in_flight_short(&self) -> usize {
        self.short.hits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(short: u32, long: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig::per_minute_and_hour(short, long))
    }

    #[test]
    fn n_plus_one_in_short_window_is_rejected() {
        let mut rl = limiter(3, 100);
        let t0 = Instant::now();
        for i in 0..3 {
            assert!(rl.try_acquire_at(t0 + Duration::from_secs(i)).is_ok());
        }
        let err = rl
            .try_acquire_at(t0 + Duration::from_secs(10))
            .expect_err("fourth call must be refused");
        assert_eq!(err.window, Window::Short);
        assert_eq!(err.retry_in, Duration::from_secs(50));
    }

    #[test]
    fn short_window_slides() {
        let mut rl = limiter(2, 100);
        let t0 = Instant::now();
        rl.try_acquire_at(t0).unwrap();
        rl.try_acquire_at(t0 + Duration::from_secs(1)).unwrap();
        assert!(rl.try_acquire_at(t0 + Duration::from_secs(59)).is_err());
        assert!(rl.try_acquire_at(t0 + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn long_window_caps_even_when_short_window_is_free() {
        let mut rl = limiter(2, 3);
        let t0 = Instant::now();
        rl.try_acquire_at(t0).unwrap();
        rl.try_acquire_at(t0 + Duration::from_secs(61)).unwrap();
        rl.try_acquire_at(t0 + Duration::from_secs(122)).unwrap();
        let err = rl
            .try_acquire_at(t0 + Duration::from_secs(183))
            .expect_err("long window is full");
        assert_eq!(err.window, Window::Long);
        assert_eq!(err.retry_in, Duration::from_secs(3600 - 183));
    }

    #[test]
    fn rejected_calls_do_not_consume_budget() {
        let mut rl = limiter(1, 100);
        let t0 = Instant::now();
        rl.try_acquire_at(t0).unwrap();
        for s in 1..10 {
            assert!(rl.try_acquire_at(t0 + Duration::from_secs(s)).is_err());
        }
        assert_eq!(rl.in_flight_short(), 1);
        assert!(rl.try_acquire_at(t0 + Duration::from_secs(60)).is_ok());
    }
}
