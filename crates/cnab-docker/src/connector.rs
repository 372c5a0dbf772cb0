//! Lazy construction of the Docker engine client.

use crate::console::Console;
use crate::engine::DockerEngine;
use async_trait::async_trait;
use bollard::Docker;
use cnab_driver::{ConnectOptions, ContainerEngine, EngineConnector, EngineError};
use std::path::PathBuf;
use std::sync::Arc;

/// Connects to the local Docker daemon.
///
/// Honors `DOCKER_HOST` and falls back to the platform's default socket.
#[derive(Debug, Clone, Default)]
pub struct DockerConnector {
    config_dir: Option<PathBuf>,
}

impl DockerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read registry credentials from `dir/config.json`.
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl EngineConnector for DockerConnector {
    async fn connect(
        &self,
        options: ConnectOptions,
    ) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        let version = docker
            .version()
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        tracing::info!(
            version = version.version.as_deref().unwrap_or("unknown"),
            api_version = version.api_version.as_deref().unwrap_or("unknown"),
            quiet = options.quiet,
            "Connected to Docker daemon"
        );

        let mut engine = DockerEngine::new(docker, Console::stdio(options.quiet));
        if let Some(dir) = &self.config_dir {
            engine = engine.with_config_dir(dir.clone());
        }
        Ok(Arc::new(engine))
    }
}
