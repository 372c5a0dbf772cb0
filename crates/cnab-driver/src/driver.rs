//! Driver facade and container lifecycle.

use crate::archive::{ArchivePlan, ArchiveStream};
use crate::config::{self, DriverSettings};
use crate::container::{apply_options, ConfigurationOption, ContainerSpec, HostSpec};
use crate::engine::{ConnectOptions, ContainerEngine, EngineConnector};
use crate::error::{DriverError, Result};
use crate::outputs::collect_outputs;
use crate::streams::{output_sink, LogForwarder, OutputSink};
use crate::types::{Operation, OperationResult, RunOutcome, IMAGE_TYPE_DOCKER, IMAGE_TYPE_OCI};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use uuid::Uuid;

/// How long `run` waits for trailing container output after exit.
pub const LOG_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Executes invocation images as ephemeral containers.
///
/// A driver is configured once through its setters and then asked to
/// [`run`](Self::run) operations. The engine client is created on first use
/// and reused for the driver's lifetime.
pub struct Driver {
    settings: HashMap<String, String>,
    simulate: bool,
    connector: Option<Arc<dyn EngineConnector>>,
    engine: OnceCell<Arc<dyn ContainerEngine>>,
    options: Vec<ConfigurationOption>,
    container_out: Option<OutputSink>,
    container_err: Option<OutputSink>,
}

/// Where setup left off: either nothing to do, or a live container.
enum Setup {
    Simulated,
    Created {
        engine: Arc<dyn ContainerEngine>,
        archive: ArchivePlan,
        container_id: String,
    },
}

impl Driver {
    /// Create a driver that connects to its engine lazily.
    pub fn new(connector: Arc<dyn EngineConnector>) -> Self {
        Self {
            settings: HashMap::new(),
            simulate: false,
            connector: Some(connector),
            engine: OnceCell::new(),
            options: Vec::new(),
            container_out: None,
            container_err: None,
        }
    }

    /// Create a driver around an already initialized engine.
    pub fn with_engine(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            settings: HashMap::new(),
            simulate: false,
            connector: None,
            engine: OnceCell::from(engine),
            options: Vec::new(),
            container_out: None,
            container_err: None,
        }
    }

    /// True for the image types this driver can run (`docker` and `oci`).
    pub fn handles(&self, image_type: &str) -> bool {
        image_type == IMAGE_TYPE_DOCKER || image_type == IMAGE_TYPE_OCI
    }

    /// Describe the recognized configuration keys.
    pub fn config(&self) -> BTreeMap<String, String> {
        config::describe()
    }

    /// Replace the active settings.
    pub fn set_config(&mut self, settings: HashMap<String, String>) {
        self.settings = settings;
    }

    /// Typed view of the active settings.
    pub fn settings(&self) -> DriverSettings {
        DriverSettings::from_map(&self.settings)
    }

    /// Enable or disable simulate mode.
    pub fn set_simulate(&mut self, simulate: bool) {
        self.simulate = simulate;
    }

    /// Use an already initialized engine instead of connecting lazily.
    ///
    /// The quiet setting is not applied to engines registered this way.
    pub fn set_engine(&mut self, engine: Arc<dyn ContainerEngine>) {
        self.engine = OnceCell::from(engine);
    }

    /// Append configuration options; they run in registration order.
    pub fn add_configuration_options(
        &mut self,
        options: impl IntoIterator<Item = ConfigurationOption>,
    ) {
        self.options.extend(options);
    }

    /// Send container stdout to `sink` instead of the process stdout.
    pub fn set_container_out(&mut self, sink: OutputSink) {
        self.container_out = Some(sink);
    }

    /// Send container stderr to `sink` instead of the process stderr.
    pub fn set_container_err(&mut self, sink: OutputSink) {
        self.container_err = Some(sink);
    }

    /// Run an operation to completion.
    ///
    /// Exactly one container is created per call and it is removed before
    /// this returns, whatever the outcome. Outputs collected before a failure
    /// are returned alongside the error.
    pub async fn run(&self, operation: &Operation) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let start = Instant::now();
        tracing::info!(
            run_id = %run_id,
            image = %operation.image,
            files = operation.files.len(),
            env = operation.environment.len(),
            "Running invocation image"
        );

        let outcome = match self.setup(run_id, operation).await {
            Ok(Setup::Simulated) => {
                tracing::info!(run_id = %run_id, "Simulate mode, skipping container execution");
                RunOutcome::success(OperationResult::default())
            }
            Ok(Setup::Created {
                engine,
                archive,
                container_id,
            }) => {
                let outcome = self
                    .execute(engine.as_ref(), run_id, &container_id, archive)
                    .await;
                remove_container(engine.as_ref(), run_id, &container_id).await;
                outcome
            }
            Err(e) => RunOutcome::failed(e),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &outcome.error {
            None => tracing::info!(
                run_id = %run_id,
                outputs = outcome.result.outputs.len(),
                elapsed_ms,
                "Invocation image finished"
            ),
            Some(e) => tracing::error!(
                run_id = %run_id,
                outputs = outcome.result.outputs.len(),
                elapsed_ms,
                error = %e,
                "Invocation image failed"
            ),
        }
        outcome
    }

    /// Everything up to and including container creation.
    ///
    /// Nothing here leaves a container behind: either an error is returned
    /// before creation, or the created container's id is handed back.
    async fn setup(&self, run_id: Uuid, operation: &Operation) -> Result<Setup> {
        // 1. Validate input paths before touching the engine
        let archive = ArchivePlan::new(&operation.files)?;

        // 2. Acquire the engine client
        let engine = self.engine().await?;

        // 3. Simulate mode stops before any mutating call
        if self.simulate {
            return Ok(Setup::Simulated);
        }

        // 4. Optional eager pull
        let settings = self.settings();
        if settings.pull_always {
            tracing::debug!(run_id = %run_id, image = %operation.image, "Pulling image (PULL_ALWAYS)");
            pull(engine.as_ref(), &operation.image).await?;
        }

        // 5. Build the container spec and apply configuration options
        let mut spec = ContainerSpec::for_operation(operation);
        let mut host = HostSpec::default();
        apply_options(&self.options, &mut spec, &mut host)
            .map_err(DriverError::ConfigurationOption)?;

        // 6. Create, pulling once if the image is missing locally
        let container_id = create_container(engine.as_ref(), run_id, &spec, &host).await?;
        tracing::debug!(run_id = %run_id, container_id = %container_id, "Container created");

        Ok(Setup::Created {
            engine,
            archive,
            container_id,
        })
    }

    /// Stage files, stream logs, start and wait, then collect outputs.
    async fn execute(
        &self,
        engine: &dyn ContainerEngine,
        run_id: Uuid,
        container_id: &str,
        archive: ArchivePlan,
    ) -> RunOutcome {
        // 1. Copy input files to the container root
        tracing::debug!(run_id = %run_id, container_id = %container_id, files = archive.len(), "Staging input files");
        if let Err(e) = stage_files(engine, container_id, archive.into_stream()).await {
            return RunOutcome::failed(e);
        }

        // 2. Attach before start so no output is lost
        let output = match engine.attach_container(container_id).await {
            Ok(output) => output,
            Err(e) => return RunOutcome::failed(DriverError::Attach(e)),
        };
        let forwarder = LogForwarder::spawn(
            container_id,
            output,
            self.container_out
                .clone()
                .unwrap_or_else(|| output_sink(tokio::io::stdout())),
            self.container_err
                .clone()
                .unwrap_or_else(|| output_sink(tokio::io::stderr())),
        );

        // 3. Register the wait, then start
        let wait = engine.wait_container(container_id);
        tracing::debug!(run_id = %run_id, container_id = %container_id, "Starting container");
        if let Err(e) = engine.start_container(container_id).await {
            forwarder.abort();
            return RunOutcome::failed(DriverError::Start(e));
        }

        // 4. Wait for the container to stop
        let status = wait.await;
        forwarder.drain(LOG_DRAIN_TIMEOUT).await;

        // 5. Collect outputs whatever the exit status
        let status = match status {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(run_id = %run_id, container_id = %container_id, error = %e, "Container wait failed");
                let (result, _) = collect_outputs(engine, container_id).await;
                return RunOutcome::new(result, Some(DriverError::Wait(e)));
            }
        };
        tracing::debug!(
            run_id = %run_id,
            container_id = %container_id,
            exit_code = status.code,
            "Container stopped"
        );

        if status.success() {
            let (result, collected) = collect_outputs(engine, container_id).await;
            return RunOutcome::new(result, collected.err());
        }

        let (result, _) = collect_outputs(engine, container_id).await;
        let message = status.message.filter(|m| !m.is_empty());
        RunOutcome::new(
            result,
            Some(DriverError::Exit {
                code: status.code,
                message,
            }),
        )
    }

    /// Return the cached engine, connecting on first use.
    async fn engine(&self) -> Result<Arc<dyn ContainerEngine>> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                let connector = self.connector.as_ref().ok_or(DriverError::NoEngine)?;
                let options = ConnectOptions {
                    quiet: self.settings().quiet,
                };
                tracing::debug!(quiet = options.quiet, "Connecting to container engine");
                connector
                    .connect(options)
                    .await
                    .map_err(DriverError::Connect)
            })
            .await?;
        Ok(Arc::clone(engine))
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("settings", &self.settings)
            .field("simulate", &self.simulate)
            .field("engine_ready", &self.engine.initialized())
            .field("options", &self.options.len())
            .finish()
    }
}

async fn pull(engine: &dyn ContainerEngine, image: &str) -> Result<()> {
    engine
        .pull_image(image)
        .await
        .map_err(|source| DriverError::Pull {
            image: image.to_string(),
            source,
        })
}

async fn create_container(
    engine: &dyn ContainerEngine,
    run_id: Uuid,
    spec: &ContainerSpec,
    host: &HostSpec,
) -> Result<String> {
    let create_error = |source| DriverError::Create {
        image: spec.image.clone(),
        source,
    };
    match engine.create_container(spec, host).await {
        Ok(id) => Ok(id),
        Err(e) if e.is_not_found() => {
            tracing::info!(run_id = %run_id, image = %spec.image, "Image not found locally, pulling");
            engine
                .notice(&format!("Unable to find image '{}' locally", spec.image))
                .await;
            pull(engine, &spec.image).await?;
            engine
                .create_container(spec, host)
                .await
                .map_err(create_error)
        }
        Err(e) => Err(create_error(e)),
    }
}

async fn stage_files(
    engine: &dyn ContainerEngine,
    container_id: &str,
    archive: ArchiveStream,
) -> Result<()> {
    let (reader, producer) = archive.into_parts();
    engine
        .copy_to_container(container_id, "/", reader)
        .await
        .map_err(DriverError::CopyIn)?;
    producer
        .finish()
        .await
        .map_err(|e| DriverError::Staging(e.to_string()))
}

async fn remove_container(engine: &dyn ContainerEngine, run_id: Uuid, container_id: &str) {
    tracing::debug!(run_id = %run_id, container_id = %container_id, "Removing container");
    if let Err(e) = engine.remove_container(container_id).await {
        tracing::warn!(
            run_id = %run_id,
            container_id = %container_id,
            error = %e,
            "Failed to remove container"
        );
    }
}
