/*!
Frame sources.

A source produces the recorded frames handed to the processor, one at a time, through a
bounded channel. Implementations:

- `file.rs`         -> `FileSource`  (replay an NDJSON file at a fixed frame interval)
- `stdin_source.rs` -> `StdinSource` (NDJSON frames from standard input)

Each source:
- parses one `RecordedFrame` per non-empty line
- logs malformed lines and continues
- respects backpressure (`send().await`): the next frame is only read once the previous one
  was taken
- ends when its input is exhausted or the receiver is dropped
*/

use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{info, trace, warn};

use crate::device::RecordedFrame;

pub mod file;
pub mod stdin_source;

pub use file::FileSource;
pub use stdin_source::StdinSource;

/// Trait implemented by all frame sources.
pub trait FrameSource: Send + Sync {
    /// Static human-readable identifier (used in logs).
    fn name(&self) -> &'static str;

    /// Start producing frames in a background task.
    fn start(&self, sender: Sender<RecordedFrame>) -> JoinHandle<()>;
}

/// Start `source`, logging its name.
pub fn spawn_source(source: &dyn FrameSource, sender: Sender<RecordedFrame>) -> JoinHandle<()> {
    info!(
        target: "autotap::sources",
        source = %source.name(),
        "Starting source task"
    );
    source.start(sender)
}

/// Forward every frame line of `reader` to `sender`, at most one per `interval`.
///
/// Returns the number of frames sent.
pub(crate) async fn forward_frames<R>(
    reader: R,
    sender: &Sender<RecordedFrame>,
    interval: Option<Duration>,
    origin: &str,
) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sent = 0;
    let mut line_number = 0usize;
    let mut next_tick = Instant::now();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(target: "autotap::sources", %origin, error = %e, "Read error; source ending");
                break;
            }
        };
        line_number += 1;
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }

        let frame = match serde_json::from_str::<RecordedFrame>(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    target: "autotap::sources",
                    %origin, line = line_number, error = %e,
                    "Failed to parse frame; skipped"
                );
                continue;
            }
        };

        if let Some(interval) = interval {
            let now = Instant::now();
            if now < next_tick {
                sleep(next_tick - now).await;
            }
            next_tick = Instant::now() + interval;
        }

        if sender.send(frame).await.is_err() {
            trace!(target: "autotap::sources", %origin, "Receiver dropped; source ending");
            break;
        }
        sent += 1;
    }
    sent
}
