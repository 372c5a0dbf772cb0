//! Container engine boundary.
//!
//! The driver never talks to a container runtime directly. Backends implement
//! [`ContainerEngine`] (and usually [`EngineConnector`] for lazy construction);
//! the `cnab-docker` crate provides the Docker one.

use crate::container::{ContainerSpec, HostSpec};
use crate::error::EngineError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// A tar archive moving into or out of a container.
pub type ArchiveReader = Pin<Box<dyn AsyncRead + Send>>;

/// The container's combined output, already split into frames.
pub type OutputStream = BoxStream<'static, Result<OutputFrame, EngineError>>;

/// Resolves once the container stops running, or the wait itself fails.
pub type ContainerWait = BoxFuture<'static, Result<WaitStatus, EngineError>>;

/// One chunk of container output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFrame {
    /// Bytes written to the container's stdout.
    Stdout(Bytes),
    /// Bytes written to the container's stderr.
    Stderr(Bytes),
}

/// Exit status of a stopped container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitStatus {
    /// Exit code.
    pub code: i64,
    /// Engine-supplied error message, if any.
    pub message: Option<String>,
}

impl WaitStatus {
    /// Status for a clean exit.
    pub fn exited(code: i64) -> Self {
        Self {
            code,
            message: None,
        }
    }

    /// True if the container exited with status 0.
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Operations the driver needs from a container runtime.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Pull an image, resolving registry credentials from the reference.
    async fn pull_image(&self, image: &str) -> Result<(), EngineError>;

    /// Create a container and return its id.
    ///
    /// Must return [`EngineError::NotFound`] when the image is not present
    /// locally.
    async fn create_container(
        &self,
        spec: &ContainerSpec,
        host: &HostSpec,
    ) -> Result<String, EngineError>;

    /// Extract a tar archive into the container at `path`.
    async fn copy_to_container(
        &self,
        id: &str,
        path: &str,
        archive: ArchiveReader,
    ) -> Result<(), EngineError>;

    /// Attach to stdout and stderr, replaying output produced so far.
    async fn attach_container(&self, id: &str) -> Result<OutputStream, EngineError>;

    /// Register a wait for the container to stop.
    ///
    /// Called before [`start_container`](Self::start_container), so the
    /// registration must happen eagerly rather than on first poll.
    fn wait_container(&self, id: &str) -> ContainerWait;

    /// Start a created container.
    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    /// Copy `path` out of the container as a tar archive.
    ///
    /// Entry names are relative to the parent of `path`.
    async fn copy_from_container(&self, id: &str, path: &str)
        -> Result<ArchiveReader, EngineError>;

    /// Remove the container.
    async fn remove_container(&self, id: &str) -> Result<(), EngineError>;

    /// Show a user-facing notice on the engine's console.
    async fn notice(&self, _message: &str) {}
}

/// Options applied when an engine client is first created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Discard the engine's own console output.
    pub quiet: bool,
}

/// Lazily constructs an engine client.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    /// Create a new engine client.
    async fn connect(&self, options: ConnectOptions)
        -> Result<Arc<dyn ContainerEngine>, EngineError>;
}
