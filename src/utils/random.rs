use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;

use crate::config::{Point, RandomizationSettings};

/// Applies bounded random offsets to positions and durations.
#[derive(Debug)]
pub struct Jitter {
    rng: StdRng,
    position_offset_px: i32,
    duration_offset_ms: u64,
}

impl Jitter {
    pub fn new(settings: &RandomizationSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            position_offset_px: settings.position_offset_px.max(0),
            duration_offset_ms: settings.duration_offset_ms,
        }
    }

    /// A point within `position_offset_px` of `point` on each axis, never negative.
    pub fn point(&mut self, point: Point) -> Point {
        Point::new(
            int_in_offset(&mut self.rng, point.x, self.position_offset_px).max(0),
            int_in_offset(&mut self.rng, point.y, self.position_offset_px).max(0),
        )
    }

    /// A duration within `duration_offset_ms` of `ms`, at least 1 ms.
    pub fn duration_ms(&mut self, ms: u64) -> u64 {
        let lo = ms.saturating_sub(self.duration_offset_ms).max(1);
        let hi = ms.saturating_add(self.duration_offset_ms).max(lo);
        if lo == hi { lo } else { self.rng.random_range(lo..=hi) }
    }
}

/// Random value in `[value - offset, value + offset]`.
pub fn int_in_offset<R: Rng + ?Sized>(rng: &mut R, value: i32, offset: i32) -> i32 {
    if offset <= 0 {
        return value;
    }
    rng.random_range(value.saturating_sub(offset)..=value.saturating_add(offset))
}

/// Apply jitter when enabled, return the value untouched otherwise.
pub fn maybe_point(jitter: Option<&mut Jitter>, point: Point) -> Point {
    match jitter {
        Some(j) => j.point(point),
        None => point,
    }
}

/// Same as [`maybe_point`] for durations expressed in milliseconds.
pub fn maybe_duration(jitter: Option<&mut Jitter>, ms: u64) -> Duration {
    match jitter {
        Some(j) => Duration::from_millis(j.duration_ms(ms)),
        None => Duration::from_millis(ms),
    }
}
