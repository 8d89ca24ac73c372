//! Time source used for sensor settle delays.
//!
//! Tests swap in `sim::ManualClock` to control when a settle
//! delay elapses.

use std::{
    fmt,
    thread,
    time::{Duration, Instant},
};

/// Monotonic time plus the ability to block the current thread on it.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time elapsed since the clock's own origin.
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration` of this clock's time.
    fn sleep(
        &self,
        duration: Duration,
    );

    /// Block until `deadline` (in this clock's time) has passed.
    fn sleep_until(
        &self,
        deadline: Duration,
    ) {
        let now = self.now();
        if deadline > now {
            self.sleep(deadline - now);
        }
    }
}

/// Wall clock backed by [`Instant`] and [`thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(
        &self,
        duration: Duration,
    ) {
        thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_until_past_deadline_returns_immediately() {
        let clock = SystemClock::new();
        let start = Instant::now();
        clock.sleep_until(Duration::ZERO);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn now_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.now() > a);
    }
}
