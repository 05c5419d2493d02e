//! File frame source.
//!
//! Replays a newline-delimited JSON file of recorded frames, one frame per line, waiting
//! `interval_ms` between two frames. The task ends at the end of the file, or early if the
//! receiver side of the channel is closed.

use std::path::PathBuf;
use std::time::Duration;

use tokio::{fs::File, io::BufReader, sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info};

use super::{FrameSource, forward_frames};
use crate::device::RecordedFrame;

/// Source replaying the frames of an NDJSON file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    interval_ms: u64,
}

impl FileSource {
    /// - `path`: NDJSON file of `RecordedFrame`s.
    /// - `interval_ms`: delay between two frames; 0 replays as fast as they are consumed.
    pub fn new(path: impl Into<PathBuf>, interval_ms: u64) -> Self {
        Self {
            path: path.into(),
            interval_ms,
        }
    }

    fn interval(&self) -> Option<Duration> {
        (self.interval_ms > 0).then(|| Duration::from_millis(self.interval_ms))
    }
}

impl FrameSource for FileSource {
    fn name(&self) -> &'static str {
        "file"
    }

    fn start(&self, sender: Sender<RecordedFrame>) -> JoinHandle<()> {
        let path = self.path.clone();
        let interval = self.interval();

        tokio::spawn(async move {
            let origin = path.display().to_string();
            info!(
                target: "autotap::sources",
                path = %origin,
                interval_ms = interval.map_or(0, |d| d.as_millis() as u64),
                "FileSource task started"
            );

            let file = match File::open(&path).await {
                Ok(file) => file,
                Err(e) => {
                    error!(
                        target: "autotap::sources",
                        path = %origin, error = %e,
                        "Failed to open frames file"
                    );
                    return;
                }
            };

            let sent = forward_frames(BufReader::new(file), &sender, interval, &origin).await;
            info!(target: "autotap::sources", path = %origin, frames = sent, "FileSource task ended");
        })
    }
}
