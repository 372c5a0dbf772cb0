//! Engine console: pull progress and notices shown to the user.

use bollard::models::CreateImageInfo;
use cnab_driver::{output_sink, OutputSink};
use tokio::io::AsyncWriteExt;

/// Where the Docker engine writes its own user-facing output.
#[derive(Clone)]
pub struct Console {
    out: OutputSink,
    err: OutputSink,
}

impl Console {
    pub fn new(out: OutputSink, err: OutputSink) -> Self {
        Self { out, err }
    }

    /// Process stdout and stderr, or a sink for both when `quiet`.
    pub fn stdio(quiet: bool) -> Self {
        if quiet {
            Self::new(output_sink(tokio::io::sink()), output_sink(tokio::io::sink()))
        } else {
            Self::new(
                output_sink(tokio::io::stdout()),
                output_sink(tokio::io::stderr()),
            )
        }
    }

    /// Write a line to the console's stdout.
    pub async fn out(&self, line: &str) {
        write_line(&self.out, line).await;
    }

    /// Write a line to the console's stderr.
    pub async fn err(&self, line: &str) {
        write_line(&self.err, line).await;
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}

async fn write_line(sink: &OutputSink, line: &str) {
    let mut writer = sink.lock().await;
    let mut written = writer.write_all(format!("{line}\n").as_bytes()).await;
    if written.is_ok() {
        written = writer.flush().await;
    }
    if let Err(e) = written {
        tracing::debug!(error = %e, "Failed to write to engine console");
    }
}

/// Render one pull progress message as `id: status progress`.
pub fn progress_line(info: &CreateImageInfo) -> Option<String> {
    let status = info.status.as_deref().filter(|s| !s.is_empty())?;
    let mut line = match info.id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => format!("{id}: {status}"),
        None => status.to_string(),
    };
    if let Some(progress) = info.progress.as_deref().filter(|p| !p.is_empty()) {
        line.push(' ');
        line.push_str(progress);
    }
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    #[derive(Clone, Default)]
    struct Buf(Arc<Mutex<Vec<u8>>>);

    impl tokio::io::AsyncWrite for Buf {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn info(id: Option<&str>, status: Option<&str>, progress: Option<&str>) -> CreateImageInfo {
        CreateImageInfo {
            id: id.map(str::to_string),
            status: status.map(str::to_string),
            progress: progress.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_progress_line_formats() {
        assert_eq!(
            progress_line(&info(Some("a1b2"), Some("Downloading"), Some("[==>   ] 1MB/4MB"))),
            Some("a1b2: Downloading [==>   ] 1MB/4MB".to_string())
        );
        assert_eq!(
            progress_line(&info(Some("a1b2"), Some("Pull complete"), None)),
            Some("a1b2: Pull complete".to_string())
        );
        assert_eq!(
            progress_line(&info(None, Some("Status: Downloaded newer image"), Some(""))),
            Some("Status: Downloaded newer image".to_string())
        );
        assert_eq!(progress_line(&info(Some("a1b2"), None, None)), None);
    }

    #[tokio::test]
    async fn test_console_routes_lines() {
        let out = Buf::default();
        let err = Buf::default();
        let console = Console::new(output_sink(out.clone()), output_sink(err.clone()));
        console.out("pulling").await;
        console.err("Unable to find image 'x' locally").await;
        assert_eq!(&*out.0.lock().unwrap(), b"pulling\n");
        assert_eq!(&*err.0.lock().unwrap(), b"Unable to find image 'x' locally\n");
    }
}
