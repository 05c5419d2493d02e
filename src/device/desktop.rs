use anyhow::{Context, Result};
use async_trait::async_trait;
use enigo::Mouse as _;
use enigo::{Button, Coordinate, Direction, Enigo, Settings};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::{DeviceExecutor, Gesture, IntentRequest, NotificationRequest};
use crate::config::{NotificationImportance, Point};

/// Interval between two pointer moves while replaying a stroke.
const STROKE_STEP: Duration = Duration::from_millis(10);

/// Executes device actions on the local desktop with optional dry-run mode.
/// In dry-run mode, actions are only logged and no real input is simulated.
///
/// Gestures are replayed with the left mouse button: press on the first point, move along
/// the path over the gesture duration, release. Intents have no desktop equivalent and
/// are only logged; notifications are written to the log.
#[derive(Debug, Clone, Default)]
pub struct DesktopExecutor {
    dry_run: bool,
}

impl DesktopExecutor {
    /// Create a new executor.
    /// - dry_run: when true, only logs instead of simulating real input.
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Returns whether the executor is currently in dry-run mode.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Enable or disable dry-run mode.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }
}

#[async_trait]
impl DeviceExecutor for DesktopExecutor {
    async fn execute_gesture(&self, gesture: Gesture) -> Result<()> {
        if self.dry_run {
            info!(
                target: "autotap::desktop",
                path = ?gesture.path,
                duration_ms = gesture.duration.as_millis() as u64,
                "DRY-RUN gesture"
            );
            return Ok(());
        }
        trace!(target: "autotap::desktop", path = ?gesture.path, "gesture");
        // Enigo blocks while the stroke is replayed.
        tokio::task::spawn_blocking(move || perform_gesture(&gesture))
            .await
            .context("Gesture task panicked")?
    }

    async fn execute_start_activity(&self, intent: IntentRequest) -> Result<()> {
        if self.dry_run {
            info!(target: "autotap::desktop", ?intent, "DRY-RUN start_activity");
            return Ok(());
        }
        warn!(
            target: "autotap::desktop",
            action = %intent.action,
            "start_activity is not supported on the desktop; ignoring"
        );
        Ok(())
    }

    async fn execute_send_broadcast(&self, intent: IntentRequest) -> Result<()> {
        if self.dry_run {
            info!(target: "autotap::desktop", ?intent, "DRY-RUN send_broadcast");
            return Ok(());
        }
        warn!(
            target: "autotap::desktop",
            action = %intent.action,
            "send_broadcast is not supported on the desktop; ignoring"
        );
        Ok(())
    }

    async fn execute_notification(&self, request: NotificationRequest) -> Result<()> {
        let NotificationRequest {
            group,
            title,
            message,
            importance,
            ..
        } = &request;
        match importance {
            NotificationImportance::Min => trace!(target: "autotap", %group, "{title}: {message}"),
            NotificationImportance::Low => debug!(target: "autotap", %group, "{title}: {message}"),
            NotificationImportance::Default => {
                info!(target: "autotap", %group, "{title}: {message}")
            }
            NotificationImportance::High => warn!(target: "autotap", %group, "{title}: {message}"),
        }
        Ok(())
    }
}

fn perform_gesture(gesture: &Gesture) -> Result<()> {
    let Some((first, rest)) = gesture.path.split_first() else {
        return Ok(());
    };

    let mut enigo = Enigo::new(&Settings::default()).context("Failed to initialize Enigo")?;
    enigo.move_mouse(first.x, first.y, Coordinate::Abs)?;
    enigo.button(Button::Left, Direction::Press)?;

    if rest.is_empty() {
        thread::sleep(gesture.duration);
    } else {
        let per_segment = gesture.duration / rest.len() as u32;
        let mut from = *first;
        for to in rest {
            for point in stroke_points(from, *to, per_segment) {
                enigo.move_mouse(point.x, point.y, Coordinate::Abs)?;
                thread::sleep(STROKE_STEP.min(per_segment));
            }
            from = *to;
        }
    }

    enigo.button(Button::Left, Direction::Release)?;
    Ok(())
}

/// Intermediate pointer positions from `from` (excluded) to `to` (included).
fn stroke_points(from: Point, to: Point, duration: Duration) -> Vec<Point> {
    let steps = (duration.as_millis() / STROKE_STEP.as_millis()).max(1) as i64;
    let lerp = |a: i32, b: i32, i: i64| {
        let (a, b) = (i64::from(a), i64::from(b));
        (a + (b - a) * i / steps) as i32
    };
    (1..=steps)
        .map(|i| Point::new(lerp(from.x, to.x, i), lerp(from.y, to.y, i)))
        .collect()
}
