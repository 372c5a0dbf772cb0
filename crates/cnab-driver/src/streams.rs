//! Container log forwarding.
//!
//! A forwarder task copies frames from the attached output stream into the
//! stdout and stderr sinks until the stream closes or a write fails. Its
//! failures are logged, never returned to the caller of `run`.

use crate::engine::{OutputFrame, OutputStream};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A shareable destination for container output.
pub type OutputSink = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Wrap a writer as an [`OutputSink`].
pub fn output_sink<W>(writer: W) -> OutputSink
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    Arc::new(Mutex::new(Box::new(writer)))
}

/// Handle to a running log forwarder.
pub(crate) struct LogForwarder {
    handle: JoinHandle<()>,
}

impl LogForwarder {
    /// Spawn a task forwarding `output` into the two sinks.
    pub(crate) fn spawn(
        container_id: &str,
        output: OutputStream,
        stdout: OutputSink,
        stderr: OutputSink,
    ) -> Self {
        let container_id = container_id.to_string();
        let handle = tokio::spawn(async move {
            forward(&container_id, output, stdout, stderr).await;
        });
        Self { handle }
    }

    /// Give the forwarder up to `timeout` to flush trailing output, then stop it.
    pub(crate) async fn drain(mut self, timeout: Duration) {
        if tokio::time::timeout(timeout, &mut self.handle).await.is_err() {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Log stream still open after container exit, detaching"
            );
            self.handle.abort();
        }
    }

    /// Stop forwarding immediately.
    pub(crate) fn abort(self) {
        self.handle.abort();
    }
}

async fn forward(
    container_id: &str,
    mut output: OutputStream,
    stdout: OutputSink,
    stderr: OutputSink,
) {
    tracing::trace!(container_id = %container_id, "Log forwarder started");
    let mut frames = 0u64;
    while let Some(frame) = output.next().await {
        let (sink, bytes) = match frame {
            Ok(OutputFrame::Stdout(bytes)) => (&stdout, bytes),
            Ok(OutputFrame::Stderr(bytes)) => (&stderr, bytes),
            Err(e) => {
                tracing::debug!(container_id = %container_id, error = %e, "Container output stream failed");
                break;
            }
        };
        let mut writer = sink.lock().await;
        let mut written = writer.write_all(&bytes).await;
        if written.is_ok() {
            written = writer.flush().await;
        }
        if let Err(e) = written {
            tracing::warn!(container_id = %container_id, error = %e, "Failed to forward container output");
            break;
        }
        frames += 1;
    }
    tracing::trace!(container_id = %container_id, frames, "Log forwarder finished");
}
