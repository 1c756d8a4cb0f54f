//! Line-delimited JSON host over an async byte stream (stdio in production).
//!
//! One reader loop decodes commands and hands them to [`HostRouter`]; one
//! writer task serializes [`OutboundFrame`]s. Every component talks to the
//! outside world only through [`HostChannel`].

mod frames;
mod router;

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

pub use frames::{FrameError, HostCommand, OutboundFrame, commands, ui_types};
pub use router::{HostChannel, HostRouter};

/// Read commands until EOF.
pub async fn read_commands<R>(router: Arc<HostRouter>, reader: R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        router.handle_line(&line).await;
    }
    info!("Input closed");
    Ok(())
}

/// Write queued frames, one JSON object per line, until every sender is gone.
pub async fn write_frames<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let line = match serde_json::to_string(&frame) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode frame: {}", e);
                continue;
            }
        };
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            error!("Failed to write frame: {}", e);
            break;
        }
        if let Err(e) = writer.write_all(b"\n").await {
            error!("Failed to write newline: {}", e);
            break;
        }
        if let Err(e) = writer.flush().await {
            error!("Failed to flush output: {}", e);
            break;
        }
    }
    debug!("Frame writer finished");
}
