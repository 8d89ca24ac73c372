//! Manually advanced clock.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::utils::clock::Clock;

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    sleepers: usize,
}

/// A [`Clock`] that only moves when [`ManualClock::advance`] is called.
/// Threads sleeping on it stay blocked until enough time has been added.
#[derive(Debug, Default)]
pub struct ManualClock {
    state: Mutex<ManualState>,
    advanced: Condvar,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(
        &self,
        by: Duration,
    ) {
        self.state.lock().now += by;
        self.advanced.notify_all();
    }

    /// Number of threads currently blocked in [`Clock::sleep`].
    pub fn sleepers(&self) -> usize {
        self.state.lock().sleepers
    }

    /// Wait (in real time) until at least `count` threads are asleep on
    /// this clock. Returns false if `timeout` passed first.
    pub fn wait_for_sleepers(
        &self,
        count: usize,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.sleepers < count {
            if self.advanced.wait_until(&mut state, deadline).timed_out() {
                return state.sleepers >= count;
            }
        }
        true
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn sleep(
        &self,
        duration: Duration,
    ) {
        if duration.is_zero() {
            return;
        }
        let mut state = self.state.lock();
        let deadline = state.now + duration;
        state.sleepers += 1;
        self.advanced.notify_all();
        while state.now < deadline {
            self.advanced.wait(&mut state);
        }
        state.sleepers -= 1;
        self.advanced.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn sleeper_wakes_only_after_advance() {
        let clock = Arc::new(ManualClock::new());
        let sleeper = {
            let clock = Arc::clone(&clock);
            thread::spawn(move || clock.sleep(Duration::from_millis(300)))
        };
        assert!(clock.wait_for_sleepers(1, Duration::from_secs(2)));

        clock.advance(Duration::from_millis(299));
        thread::sleep(Duration::from_millis(20));
        assert!(!sleeper.is_finished());

        clock.advance(Duration::from_millis(1));
        sleeper.join().unwrap();
        assert_eq!(clock.sleepers(), 0);
        assert_eq!(clock.now(), Duration::from_millis(300));
    }
}
