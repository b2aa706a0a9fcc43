//! Hand-driven clock.

use crate::application::ports::Clock;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Clock that only moves when a test moves it.
///
/// Rate windows, session idle time and breaker recovery read the monotonic
/// side. Comment timestamps read the wall-clock side, which starts at
/// 2024-01-01T00:00:00Z unless given and advances in lockstep. Clones share
/// one timeline.
///
/// ```
/// use formgate::application::ports::Clock;
/// use formgate::infrastructure::mocks::MockClock;
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let clock = MockClock::new(start);
/// let observer = clock.clone();
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(observer.now(), start + Duration::from_secs(10));
/// assert_eq!(observer.utc_now().to_rfc3339(), "2024-01-01T00:00:10+00:00");
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    timeline: Arc<Mutex<Timeline>>,
}

#[derive(Debug)]
struct Timeline {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset: Duration,
}

impl MockClock {
    pub fn new(start: Instant) -> Self {
        let wall_origin = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default();
        Self::with_wall_clock(start, wall_origin)
    }

    /// Start the wall-clock side at `wall_start` instead.
    pub fn with_wall_clock(start: Instant, wall_start: DateTime<Utc>) -> Self {
        Self {
            timeline: Arc::new(Mutex::new(Timeline {
                origin: start,
                wall_origin: wall_start,
                offset: Duration::ZERO,
            })),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.timeline().offset += duration;
    }

    /// Jump to `instant`. Instants before the start clamp to the start.
    pub fn set(&self, instant: Instant) {
        let mut timeline = self.timeline();
        timeline.offset = instant.saturating_duration_since(timeline.origin);
    }

    fn timeline(&self) -> MutexGuard<'_, Timeline> {
        self.timeline
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        let timeline = self.timeline();
        timeline.origin + timeline.offset
    }

    fn utc_now(&self) -> DateTime<Utc> {
        let timeline = self.timeline();
        let elapsed =
            chrono::Duration::from_std(timeline.offset).unwrap_or_else(|_| chrono::Duration::zero());
        timeline.wall_origin + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_and_set() {
        let start = Instant::now();
        let clock = MockClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(900));
        assert_eq!(clock.now(), start + Duration::from_secs(900));

        clock.set(start + Duration::from_secs(30));
        assert_eq!(clock.now(), start + Duration::from_secs(30));
    }

    #[test]
    fn test_wall_clock_moves_with_instants() {
        let wall = Utc.with_ymd_and_hms(2024, 7, 4, 18, 30, 0).unwrap();
        let clock = MockClock::with_wall_clock(Instant::now(), wall);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.utc_now(), wall + chrono::Duration::seconds(90));
    }
}
