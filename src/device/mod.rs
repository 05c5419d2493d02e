/*!
Device capabilities consumed by the engine.

The engine never touches the screen or the OS itself. It goes through:
- `Detector`: matches reference images and text on the current frame.
- `BitmapSupplier`: loads the reference image of an image condition.
- `DeviceExecutor`: performs gestures, intents and notifications.

Implementations shipped with the crate:
- `desktop::DesktopExecutor`: input synthesis on the local desktop (Enigo), with dry-run.
- `replay::ReplayDetector` / `replay::PathBitmapSupplier`: replay of recorded detections.
*/

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::config::{ExtraValue, ImageCondition, NotificationImportance, Point, Rect};

pub mod desktop;
pub mod replay;

pub use desktop::DesktopExecutor;
pub use replay::{PathBitmapSupplier, RecordedFrame, RecordedMatch, ReplayDetector};

/// Width and height of a frame, in pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

/// A captured screen image.
pub trait ScreenFrame {
    fn size(&self) -> ScreenSize;
}

/// Outcome of one detection on the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectionResult {
    pub is_detected: bool,
    /// Center of the best match, if any.
    pub position: Option<Point>,
    /// Confidence of the best match, in [0, 1].
    pub confidence: f64,
}

impl DetectionResult {
    pub fn not_detected() -> Self {
        Self::default()
    }
}

/// Image/text matching engine.
///
/// `area` restricts the search; `None` means the whole screen.
pub trait Detector {
    type Frame: ScreenFrame;
    type Bitmap: Send;

    /// Recompute the scaling metrics. Called once per screen size change.
    fn set_metrics(&mut self, frame: &Self::Frame, quality: u32);

    /// Set the frame the next detections run on.
    fn set_screen_frame(&mut self, frame: &Self::Frame);

    fn detect(&mut self, bitmap: &Self::Bitmap, area: Option<Rect>, threshold: u32)
    -> DetectionResult;

    fn detect_text(
        &mut self,
        text: &str,
        language: &str,
        area: Option<Rect>,
        threshold: u32,
    ) -> DetectionResult;
}

/// Loads the reference image of an image condition. A missing image is not an error.
#[async_trait]
pub trait BitmapSupplier: Send + Sync {
    type Bitmap: Send;

    async fn load(&self, condition: &ImageCondition) -> Option<Self::Bitmap>;
}

/// A single-stroke gesture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gesture {
    /// Points of the stroke. A tap has one point, a swipe two.
    pub path: Vec<Point>,
    pub duration: Duration,
}

impl Gesture {
    pub fn tap(at: Point, duration: Duration) -> Self {
        Self {
            path: vec![at],
            duration,
        }
    }

    pub fn line(from: Point, to: Point, duration: Duration) -> Self {
        Self {
            path: vec![from, to],
            duration,
        }
    }
}

/// An intent to start an activity or to broadcast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentRequest {
    pub action: String,
    pub component: Option<String>,
    pub flags: i32,
    pub extras: Vec<(String, ExtraValue)>,
}

/// A notification to post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    pub event_id: u64,
    /// Name of the event that posted it, used to group notifications.
    pub group: String,
    pub title: String,
    pub message: String,
    pub importance: NotificationImportance,
}

/// Performs the actions requiring an interaction with the device.
///
/// Each call completes once the device is done; errors are fatal to the current loop.
#[async_trait]
pub trait DeviceExecutor: Send + Sync {
    async fn execute_gesture(&self, gesture: Gesture) -> anyhow::Result<()>;

    async fn execute_start_activity(&self, intent: IntentRequest) -> anyhow::Result<()>;

    async fn execute_send_broadcast(&self, intent: IntentRequest) -> anyhow::Result<()>;

    async fn execute_notification(&self, request: NotificationRequest) -> anyhow::Result<()>;

    /// Reset any state kept from a previous session.
    fn clear_state(&self) {}
}
