//! Container specification and configuration hooks.

use crate::error::BoxError;
use crate::types::Operation;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Entrypoint every invocation image is started with.
pub const INVOCATION_ENTRYPOINT: &str = "/cnab/app/run";

/// Container-level settings handed to the engine on creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image to create the container from.
    pub image: String,
    /// Environment as `KEY=VALUE` entries.
    pub env: Vec<String>,
    /// Entrypoint command.
    pub entrypoint: Vec<String>,
    /// Attach the container's stdout.
    pub attach_stdout: bool,
    /// Attach the container's stderr.
    pub attach_stderr: bool,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// User the entrypoint runs as.
    pub user: Option<String>,
    /// Container labels.
    pub labels: BTreeMap<String, String>,
}

impl ContainerSpec {
    /// Build the spec for running an operation's invocation image.
    pub fn for_operation(operation: &Operation) -> Self {
        Self {
            image: operation.image.clone(),
            env: operation
                .environment
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect(),
            entrypoint: vec![INVOCATION_ENTRYPOINT.to_string()],
            attach_stdout: true,
            attach_stderr: true,
            ..Default::default()
        }
    }
}

/// Host-level settings handed to the engine on creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostSpec {
    /// Bind mounts in `host:container[:mode]` form.
    pub binds: Vec<String>,
    /// Memory limit in bytes.
    pub memory_bytes: Option<i64>,
    /// CPU quota in units of 1e-9 CPUs.
    pub nano_cpus: Option<i64>,
    /// Network mode (e.g. `bridge`, `host`, `none`).
    pub network_mode: Option<String>,
    /// Run the container privileged.
    pub privileged: bool,
}

/// A hook that adjusts the container and host specs before creation.
///
/// Options run in registration order; the first error aborts the run.
pub type ConfigurationOption =
    Arc<dyn Fn(&mut ContainerSpec, &mut HostSpec) -> Result<(), BoxError> + Send + Sync>;

/// Wrap a closure as a [`ConfigurationOption`].
pub fn configuration_option<F>(f: F) -> ConfigurationOption
where
    F: Fn(&mut ContainerSpec, &mut HostSpec) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Apply options in order, stopping at the first failure.
pub(crate) fn apply_options(
    options: &[ConfigurationOption],
    spec: &mut ContainerSpec,
    host: &mut HostSpec,
) -> Result<(), BoxError> {
    for option in options {
        option(spec, host)?;
    }
    Ok(())
}
