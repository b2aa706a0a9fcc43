//! Process clock.
//!
//! Rate windows, session idle time and the circuit breaker read the monotonic
//! side; comment timestamps read the wall-clock side. Tests swap in
//! `MockClock` from [`crate::infrastructure::mocks`] to drive both.

use crate::application::ports::Clock;
use chrono::{DateTime, Utc};
use std::time::Instant;

/// The operating system's clocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use std::time::Duration;

    #[test]
    fn test_instants_advance() {
        let clock = SystemClock::new();
        let before = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now() > before);
    }

    #[test]
    fn test_wall_clock_is_current() {
        assert!(SystemClock.utc_now().year() >= 2024);
    }
}
