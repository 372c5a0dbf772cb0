//! Driver settings.
//!
//! Settings arrive as a flat string map (usually lifted from the process
//! environment). [`DriverSettings`] is the typed view the driver reads.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Increase verbosity.
pub const VERBOSE: &str = "VERBOSE";

/// Always pull the image before creating the container.
pub const PULL_ALWAYS: &str = "PULL_ALWAYS";

/// Silence the engine's own console output.
pub const DOCKER_DRIVER_QUIET: &str = "DOCKER_DRIVER_QUIET";

/// Directory under which collected outputs are staged on the host.
pub const OUTPUTS_MOUNT_PATH: &str = "OUTPUTS_MOUNT_PATH";

/// Every recognized setting key.
pub const SETTING_KEYS: [&str; 4] = [VERBOSE, PULL_ALWAYS, DOCKER_DRIVER_QUIET, OUTPUTS_MOUNT_PATH];

/// Describe the recognized settings and their effect.
pub fn describe() -> BTreeMap<String, String> {
    [
        (
            VERBOSE,
            "Increase verbosity. true, false are supported values",
        ),
        (
            PULL_ALWAYS,
            "Always pull image, even if locally available (0|1)",
        ),
        (
            DOCKER_DRIVER_QUIET,
            "Make the Docker driver quiet (only print container stdout/stderr)",
        ),
        (
            OUTPUTS_MOUNT_PATH,
            "Absolute path to where Docker driver can create temporary directories to bundle outputs. Defaults to temp dir.",
        ),
    ]
    .into_iter()
    .map(|(key, description)| (key.to_string(), description.to_string()))
    .collect()
}

/// Typed view over the driver's string-keyed settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverSettings {
    /// Verbose logging requested.
    pub verbose: bool,
    /// Pull the image on every run.
    pub pull_always: bool,
    /// Discard the engine's own console output.
    pub quiet: bool,
    /// Host directory for staged outputs.
    pub outputs_mount_path: Option<PathBuf>,
}

impl DriverSettings {
    /// Parse settings from a string map. Unknown keys are ignored.
    pub fn from_map(settings: &HashMap<String, String>) -> Self {
        Self {
            verbose: settings
                .get(VERBOSE)
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            pull_always: settings.get(PULL_ALWAYS).is_some_and(|v| v == "1"),
            quiet: settings.get(DOCKER_DRIVER_QUIET).is_some_and(|v| v == "1"),
            outputs_mount_path: settings
                .get(OUTPUTS_MOUNT_PATH)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Collect the recognized keys from the process environment.
    ///
    /// | Variable | Effect |
    /// |----------|--------|
    /// | `VERBOSE` | `true` or `1` enables verbose logging |
    /// | `PULL_ALWAYS` | `1` pulls the image on every run |
    /// | `DOCKER_DRIVER_QUIET` | `1` silences engine console output |
    /// | `OUTPUTS_MOUNT_PATH` | output staging directory |
    pub fn env_map() -> HashMap<String, String> {
        SETTING_KEYS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect()
    }

    /// Load settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_map(&Self::env_map())
    }

    /// Directory for staged outputs, falling back to the system temp dir.
    pub fn outputs_dir(&self) -> PathBuf {
        self.outputs_mount_path
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}
