//! Stdin frame source.
//!
//! Reads newline-delimited JSON frames from standard input, e.g.:
//!     cat frames.ndjson | autotap --scenario scenario.json
//!
//! Frames are forwarded as soon as they are read; pacing is left to the producer.

use tokio::{
    io::{self, BufReader},
    sync::mpsc::Sender,
    task::JoinHandle,
};
use tracing::info;

use super::{FrameSource, forward_frames};
use crate::device::RecordedFrame;

/// Source that reads newline-delimited JSON frames from stdin.
#[derive(Debug, Clone, Default)]
pub struct StdinSource;

impl StdinSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FrameSource for StdinSource {
    fn name(&self) -> &'static str {
        "stdin"
    }

    fn start(&self, sender: Sender<RecordedFrame>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(target: "autotap::sources", "StdinSource task started (reading lines)");
            let sent = forward_frames(BufReader::new(io::stdin()), &sender, None, "stdin").await;
            info!(target: "autotap::sources", frames = sent, "EOF on stdin; StdinSource exiting");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_new() {
        assert_eq!(StdinSource::new().name(), "stdin");
    }
}
