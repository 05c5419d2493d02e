//! Replay of recorded detections.
//!
//! A `RecordedFrame` carries the verdicts a real detector produced (or a test wants it
//! to produce) for one captured frame: for each reference image path and text literal
//! found on screen, where it was found and with which confidence. `ReplayDetector`
//! answers the engine's detection requests from it, honoring the search area and the
//! threshold exactly like a live detector would.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{trace, warn};

use super::{BitmapSupplier, DetectionResult, Detector, ScreenFrame, ScreenSize};
use crate::config::{ImageCondition, Point, Rect};

/// Slack for the confidence/threshold comparison.
const THRESHOLD_EPSILON: f64 = 1e-9;

/// One captured frame with its recorded matches.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RecordedFrame {
    pub width: u32,
    pub height: u32,

    /// Image path -> best match.
    #[serde(default)]
    pub images: HashMap<String, RecordedMatch>,

    /// Text literal -> best match.
    #[serde(default)]
    pub texts: HashMap<String, RecordedMatch>,

    /// Broadcast actions received right before this frame.
    #[serde(default)]
    pub broadcasts: Vec<String>,
}

impl RecordedFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub fn with_image(mut self, path: &str, x: i32, y: i32, confidence: f64) -> Self {
        self.images
            .insert(path.to_string(), RecordedMatch { x, y, confidence });
        self
    }

    pub fn with_text(mut self, text: &str, x: i32, y: i32, confidence: f64) -> Self {
        self.texts
            .insert(text.to_string(), RecordedMatch { x, y, confidence });
        self
    }
}

impl ScreenFrame for RecordedFrame {
    fn size(&self) -> ScreenSize {
        ScreenSize {
            width: self.width,
            height: self.height,
        }
    }
}

/// Best match of a reference on a frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RecordedMatch {
    pub x: i32,
    pub y: i32,
    /// In [0, 1].
    pub confidence: f64,
}

/// Detector answering from the current `RecordedFrame`.
///
/// A reference is detected when it was recorded, its difference (`1 - confidence`, in
/// percent) is within the threshold, and it lies inside the search area.
#[derive(Debug, Default)]
pub struct ReplayDetector {
    current: Option<RecordedFrame>,
    quality: Option<u32>,
    metrics_updates: usize,
}

impl ReplayDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_metrics` calls received so far.
    pub fn metrics_updates(&self) -> usize {
        self.metrics_updates
    }

    /// Quality hint of the last `set_metrics` call.
    pub fn quality(&self) -> Option<u32> {
        self.quality
    }

    fn evaluate(recorded: Option<&RecordedMatch>, area: Option<Rect>, threshold: u32) -> DetectionResult {
        let Some(m) = recorded else {
            return DetectionResult::not_detected();
        };
        let position = Point::new(m.x, m.y);
        let in_area = area.is_none_or(|a| a.contains(position));
        let difference = (1.0 - m.confidence) * 100.0;
        let is_detected = in_area && difference <= f64::from(threshold) + THRESHOLD_EPSILON;
        DetectionResult {
            is_detected,
            position: Some(position),
            confidence: m.confidence,
        }
    }
}

impl Detector for ReplayDetector {
    type Frame = RecordedFrame;
    type Bitmap = String;

    fn set_metrics(&mut self, frame: &RecordedFrame, quality: u32) {
        trace!(
            target: "autotap::replay",
            width = frame.width, height = frame.height, quality,
            "set_metrics"
        );
        self.quality = Some(quality);
        self.metrics_updates += 1;
    }

    fn set_screen_frame(&mut self, frame: &RecordedFrame) {
        self.current = Some(frame.clone());
    }

    fn detect(&mut self, bitmap: &String, area: Option<Rect>, threshold: u32) -> DetectionResult {
        let recorded = self.current.as_ref().and_then(|f| f.images.get(bitmap));
        Self::evaluate(recorded, area, threshold)
    }

    fn detect_text(
        &mut self,
        text: &str,
        _language: &str,
        area: Option<Rect>,
        threshold: u32,
    ) -> DetectionResult {
        let recorded = self.current.as_ref().and_then(|f| f.texts.get(text));
        Self::evaluate(recorded, area, threshold)
    }
}

/// Supplies the image path as the bitmap of a condition.
///
/// With a root directory, the image must exist under it; a missing file yields no bitmap.
#[derive(Debug, Clone, Default)]
pub struct PathBitmapSupplier {
    root: Option<PathBuf>,
}

impl PathBitmapSupplier {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

#[async_trait]
impl BitmapSupplier for PathBitmapSupplier {
    type Bitmap = String;

    async fn load(&self, condition: &ImageCondition) -> Option<String> {
        let Some(root) = &self.root else {
            return Some(condition.path.clone());
        };
        let full = root.join(&condition.path);
        match tokio::fs::try_exists(&full).await {
            Ok(true) => Some(condition.path.clone()),
            Ok(false) | Err(_) => {
                warn!(
                    target: "autotap::replay",
                    path = %full.display(),
                    "Reference image not found"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionType;

    fn image(path: &str) -> ImageCondition {
        ImageCondition {
            path: path.into(),
            area: Rect::new(0, 0, 10, 10),
            detection: DetectionType::WholeScreen,
            threshold: 4,
            should_be_detected: true,
        }
    }

    #[test]
    fn detects_recorded_match_within_threshold() {
        let mut d = ReplayDetector::new();
        d.set_screen_frame(&RecordedFrame::new(100, 100).with_image("a.png", 5, 6, 0.96));
        let r = d.detect(&"a.png".to_string(), None, 4);
        assert!(r.is_detected);
        assert_eq!(r.position, Some(Point::new(5, 6)));

        let r = d.detect(&"a.png".to_string(), None, 3);
        assert!(!r.is_detected);
    }

    #[test]
    fn area_restricts_detection() {
        let mut d = ReplayDetector::new();
        d.set_screen_frame(&RecordedFrame::new(100, 100).with_text("Play", 50, 50, 1.0));
        assert!(!d.detect_text("Play", "eng", Some(Rect::new(0, 0, 10, 10)), 4).is_detected);
        assert!(d.detect_text("Play", "eng", Some(Rect::new(40, 40, 20, 20)), 4).is_detected);
        assert!(!d.detect_text("Stop", "eng", None, 4).is_detected);
    }

    #[test]
    fn metrics_updates_are_counted() {
        let mut d = ReplayDetector::new();
        d.set_metrics(&RecordedFrame::new(10, 10), 900);
        assert_eq!(d.metrics_updates(), 1);
        assert_eq!(d.quality(), Some(900));
    }

    #[test]
    fn frame_parses_from_json() {
        let f: RecordedFrame = serde_json::from_str(
            r#"{"width":1080,"height":1920,"images":{"ok.png":{"x":1,"y":2,"confidence":0.99}},"broadcasts":["ping"]}"#,
        )
        .unwrap();
        assert_eq!(f.size(), ScreenSize { width: 1080, height: 1920 });
        assert_eq!(f.broadcasts, vec!["ping"]);
    }

    #[tokio::test]
    async fn supplier_without_root_passes_the_path() {
        let s = PathBitmapSupplier::new(None);
        assert_eq!(s.load(&image("x.png")).await.as_deref(), Some("x.png"));
    }

    #[tokio::test]
    async fn supplier_misses_absent_files() {
        let s = PathBitmapSupplier::new(Some(std::env::temp_dir()));
        assert!(s.load(&image("autotap-definitely-missing.png")).await.is_none());
    }
}
