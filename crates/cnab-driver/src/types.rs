//! Operation and result types exchanged with the driver.

use crate::error::DriverError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Invocation image type for images run through a Docker engine.
pub const IMAGE_TYPE_DOCKER: &str = "docker";

/// Invocation image type for OCI images.
pub const IMAGE_TYPE_OCI: &str = "oci";

/// A request to execute one invocation image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Image reference to run.
    pub image: String,
    /// Environment variables passed to the container.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Files injected into the container, keyed by absolute in-container path.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl Operation {
    /// Create an operation for the given image with no environment or files.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Add a file to inject at an absolute in-container path.
    pub fn file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

/// Files produced by one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Output file contents keyed by full in-container path.
    pub outputs: BTreeMap<String, String>,
}

impl OperationResult {
    /// True if no outputs were collected.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Outcome of a run: the collected outputs paired with an optional error.
///
/// Outputs may be present even when `error` is set, so callers should
/// inspect both.
#[derive(Debug, Default)]
#[must_use = "a failed run may still carry partial outputs"]
pub struct RunOutcome {
    /// Outputs collected from the container, possibly partial.
    pub result: OperationResult,
    /// The failure that ended the run, if any.
    pub error: Option<DriverError>,
}

impl RunOutcome {
    pub(crate) fn new(result: OperationResult, error: Option<DriverError>) -> Self {
        Self { result, error }
    }

    pub(crate) fn success(result: OperationResult) -> Self {
        Self::new(result, None)
    }

    pub(crate) fn failed(error: DriverError) -> Self {
        Self::new(OperationResult::default(), Some(error))
    }

    /// True if the run finished without error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Split into outputs and error.
    pub fn into_parts(self) -> (OperationResult, Option<DriverError>) {
        (self.result, self.error)
    }

    /// Convert into a `Result`, discarding partial outputs on error.
    pub fn into_result(self) -> Result<OperationResult, DriverError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }
}
