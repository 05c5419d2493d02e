use std::time::Duration;
use tokio::time::Instant;

use crate::config::{Point, UnblockSettings};
use crate::device::Gesture;

/// Periodic tap injected to work around devices dropping gestures after a while.
///
/// Due once `every_loops` processing loops, or `every_ms` milliseconds, have passed since
/// the last injection (or since the scheduler was created).
#[derive(Debug, Clone)]
pub struct UnblockGestureScheduler {
    every_loops: Option<u32>,
    every: Option<Duration>,
    loops: u32,
    last: Instant,
}

impl UnblockGestureScheduler {
    /// `None` when disabled or when no threshold is configured.
    pub fn new(settings: &UnblockSettings, now: Instant) -> Option<Self> {
        let every_loops = settings.every_loops.filter(|n| *n > 0);
        let every = settings.every_ms.map(Duration::from_millis);
        if !settings.enabled || (every_loops.is_none() && every.is_none()) {
            return None;
        }
        Some(Self {
            every_loops,
            every,
            loops: 0,
            last: now,
        })
    }

    /// Count one finished loop. Returns true, and restarts both thresholds, when due.
    pub fn on_loop_finished(&mut self, now: Instant) -> bool {
        self.loops += 1;
        let loops_due = self.every_loops.is_some_and(|n| self.loops >= n);
        let time_due = self.every.is_some_and(|d| now.duration_since(self.last) >= d);
        if loops_due || time_due {
            self.loops = 0;
            self.last = now;
            true
        } else {
            false
        }
    }

    /// The minimal gesture injected when due.
    pub fn gesture() -> Gesture {
        Gesture::tap(Point::new(0, 0), Duration::from_millis(1))
    }
}
