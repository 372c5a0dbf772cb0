//! [`ContainerEngine`] over the Docker Engine API.

use crate::auth::{self, AuthError};
use crate::console::{progress_line, Console};
use crate::reference::ImageReference;
use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, Config, DownloadFromContainerOptions, InspectContainerOptions,
    LogOutput, RemoveContainerOptions, StartContainerOptions, UploadToContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerState, ContainerStateStatusEnum, HostConfig};
use bollard::Docker;
use cnab_driver::{
    ArchiveReader, ContainerEngine, ContainerSpec, ContainerWait, EngineError, HostSpec,
    OutputFrame, OutputStream, WaitStatus,
};
use futures::{future, StreamExt};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::io::{ReaderStream, StreamReader};
use tokio_util::task::AbortOnDropHandle;

/// Wait condition that only fires on an exit after registration.
///
/// `not-running` would resolve immediately for a created container.
const WAIT_CONDITION: &str = "next-exit";

/// How often the recorded container state is checked while waiting.
///
/// Covers an exit the wait request missed, e.g. one that happened before the
/// daemon registered the wait.
const EXIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Docker-backed container engine.
pub struct DockerEngine {
    docker: Docker,
    console: Console,
    config_dir: Option<PathBuf>,
}

impl DockerEngine {
    /// Wrap a connected client.
    pub fn new(docker: Docker, console: Console) -> Self {
        Self {
            docker,
            console,
            config_dir: auth::default_config_dir(),
        }
    }

    /// Read registry credentials from `dir` instead of the default location.
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// The underlying bollard client.
    pub fn client(&self) -> &Docker {
        &self.docker
    }

    fn credentials(
        &self,
        image: &ImageReference,
    ) -> Result<Option<bollard::auth::DockerCredentials>, AuthError> {
        match &self.config_dir {
            Some(dir) => auth::resolve_credentials(dir, image),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for DockerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerEngine")
            .field("config_dir", &self.config_dir)
            .finish_non_exhaustive()
    }
}

/// Map a bollard error onto the engine taxonomy.
pub(crate) fn engine_error(e: BollardError) -> EngineError {
    match e {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => EngineError::Api(format!("{message} (status {status_code})")),
        BollardError::DockerStreamError { error } => EngineError::Stream(error),
        BollardError::IOError { err } => EngineError::Io(err),
        other => EngineError::Api(other.to_string()),
    }
}

/// Translate the driver's spec into a bollard create body.
pub(crate) fn container_config(spec: &ContainerSpec, host: &HostSpec) -> Config<String> {
    Config {
        image: Some(spec.image.clone()),
        env: Some(spec.env.clone()),
        entrypoint: Some(spec.entrypoint.clone()),
        attach_stdout: Some(spec.attach_stdout),
        attach_stderr: Some(spec.attach_stderr),
        working_dir: spec.working_dir.clone(),
        user: spec.user.clone(),
        labels: (!spec.labels.is_empty())
            .then(|| spec.labels.clone().into_iter().collect()),
        host_config: Some(HostConfig {
            binds: (!host.binds.is_empty()).then(|| host.binds.clone()),
            memory: host.memory_bytes,
            nano_cpus: host.nano_cpus,
            network_mode: host.network_mode.clone(),
            privileged: host.privileged.then_some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        let reference =
            ImageReference::parse(image).map_err(|e| EngineError::Api(e.to_string()))?;
        let credentials = self
            .credentials(&reference)
            .map_err(|e| EngineError::Api(format!("unable to resolve registry credentials: {e}")))?;
        tracing::info!(
            image = %reference,
            authenticated = credentials.is_some(),
            "Pulling image"
        );

        let options = CreateImageOptions {
            from_image: reference.name(),
            tag: reference.pull_tag().to_string(),
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, credentials);
        while let Some(info) = progress.next().await {
            let info = info.map_err(engine_error)?;
            if let Some(error) = info.error.as_deref() {
                return Err(EngineError::Stream(error.to_string()));
            }
            if let Some(line) = progress_line(&info) {
                self.console.out(&line).await;
            }
        }
        Ok(())
    }

    async fn create_container(
        &self,
        spec: &ContainerSpec,
        host: &HostSpec,
    ) -> Result<String, EngineError> {
        let response = self
            .docker
            .create_container::<String, String>(None, container_config(spec, host))
            .await
            .map_err(engine_error)?;
        for warning in &response.warnings {
            tracing::warn!(container_id = %response.id, warning = %warning, "Docker create warning");
        }
        Ok(response.id)
    }

    async fn copy_to_container(
        &self,
        id: &str,
        path: &str,
        archive: ArchiveReader,
    ) -> Result<(), EngineError> {
        let options = UploadToContainerOptions {
            path: path.to_string(),
            no_overwrite_dir_non_dir: "true".to_string(),
        };
        let body = ReaderStream::new(archive)
            .inspect(|chunk| {
                if let Err(e) = chunk {
                    tracing::warn!(error = %e, "Archive stream failed during upload");
                }
            })
            .take_while(|chunk| future::ready(chunk.is_ok()))
            .filter_map(|chunk| future::ready(chunk.ok()));
        self.docker
            .upload_to_container_streaming(id, Some(options), body)
            .await
            .map_err(engine_error)
    }

    async fn attach_container(&self, id: &str) -> Result<OutputStream, EngineError> {
        let options = AttachContainerOptions::<String> {
            stream: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            logs: Some(true),
            ..Default::default()
        };
        let attached = self
            .docker
            .attach_container(id, Some(options))
            .await
            .map_err(engine_error)?;
        let frames = attached.output.filter_map(|frame| {
            future::ready(match frame {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    Some(Ok(OutputFrame::Stdout(message)))
                }
                Ok(LogOutput::StdErr { message }) => Some(Ok(OutputFrame::Stderr(message))),
                Ok(LogOutput::StdIn { .. }) => None,
                Err(e) => Some(Err(engine_error(e))),
            })
        });
        Ok(frames.boxed())
    }

    fn wait_container(&self, id: &str) -> ContainerWait {
        let docker = self.docker.clone();
        let id = id.to_string();
        let task = AbortOnDropHandle::new(tokio::spawn(async move {
            wait_for_exit(&docker, &id).await
        }));
        Box::pin(async move {
            task.await
                .map_err(|e| EngineError::Stream(format!("wait task failed: {e}")))?
        })
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(engine_error)
    }

    async fn copy_from_container(
        &self,
        id: &str,
        path: &str,
    ) -> Result<ArchiveReader, EngineError> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let mut chunks = self.docker.download_from_container(id, Some(options)).boxed();
        // The request is only sent on first poll; surface a failure to start
        // the copy here rather than as a read error.
        let first = match chunks.next().await {
            Some(chunk) => chunk.map_err(engine_error)?,
            None => return Ok(Box::pin(tokio::io::empty())),
        };
        let body = futures::stream::once(future::ready(Ok(first)))
            .chain(chunks)
            .map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(Box::pin(StreamReader::new(body)))
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(engine_error)
    }

    async fn notice(&self, message: &str) {
        self.console.err(message).await;
    }
}

async fn wait_for_exit(docker: &Docker, id: &str) -> Result<WaitStatus, EngineError> {
    let options = WaitContainerOptions {
        condition: WAIT_CONDITION,
    };
    let mut responses = docker.wait_container(id, Some(options)).boxed();
    let start = tokio::time::Instant::now() + EXIT_POLL_INTERVAL;
    let mut poll = tokio::time::interval_at(start, EXIT_POLL_INTERVAL);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            response = responses.next() => return wait_response(response),
            _ = poll.tick() => match recorded_exit(docker, id).await {
                Ok(Some(status)) => {
                    tracing::debug!(container_id = %id, code = status.code, "Exit taken from container state");
                    return Ok(status);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(container_id = %id, error = %e, "Container inspect failed while waiting"),
            },
        }
    }
}

fn wait_response(
    response: Option<Result<bollard::models::ContainerWaitResponse, BollardError>>,
) -> Result<WaitStatus, EngineError> {
    match response {
        Some(Ok(response)) => Ok(WaitStatus {
            code: response.status_code,
            message: response
                .error
                .and_then(|e| e.message)
                .filter(|m| !m.is_empty()),
        }),
        // Non-zero exits arrive as this error variant.
        Some(Err(BollardError::DockerContainerWaitError { error, code })) => Ok(WaitStatus {
            code,
            message: Some(error).filter(|m| !m.is_empty()),
        }),
        Some(Err(e)) => Err(engine_error(e)),
        None => Err(EngineError::Stream(
            "wait stream closed before the container stopped".to_string(),
        )),
    }
}

async fn recorded_exit(docker: &Docker, id: &str) -> Result<Option<WaitStatus>, EngineError> {
    let inspect = docker
        .inspect_container(id, None::<InspectContainerOptions>)
        .await
        .map_err(engine_error)?;
    Ok(inspect.state.as_ref().and_then(exited_status))
}

/// Exit status recorded in a container's state, once it has stopped.
///
/// A created or running container has none.
pub(crate) fn exited_status(state: &ContainerState) -> Option<WaitStatus> {
    match state.status {
        Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD) => {
            Some(WaitStatus {
                code: state.exit_code.unwrap_or(-1),
                message: state.error.clone().filter(|m| !m.is_empty()),
            })
        }
        _ => None,
    }
}
