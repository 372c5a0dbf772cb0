//! Image references.
//!
//! Parsing and normalization come from [`oci_distribution::Reference`]: a
//! reference without a registry lives on Docker Hub and single-component Hub
//! repositories live under `library/`. This module adds the pull parameters
//! and the credential key the Docker API expects.

use oci_distribution::Reference;
use std::fmt;
use thiserror::Error;

/// Registry assumed when a reference names none.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Key Docker Hub credentials are stored under in the client config.
pub const DOCKER_HUB_AUTH_SERVER: &str = "https://index.docker.io/v1/";

const LEGACY_HUB_REGISTRY: &str = "index.docker.io";
const DEFAULT_TAG: &str = "latest";

/// Errors from parsing an image reference.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    /// Reference string was empty
    #[error("image reference is empty")]
    Empty,

    /// Reference string could not be parsed
    #[error("invalid image reference '{reference}': {reason}")]
    Invalid {
        /// The offending reference
        reference: String,
        /// Parser message
        reason: String,
    },
}

/// A parsed, normalized image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    inner: Reference,
}

impl ImageReference {
    /// Parse a reference such as `ubuntu`, `org/app:1.0` or
    /// `registry.local:5000/app@sha256:...`.
    pub fn parse(reference: &str) -> Result<Self, ReferenceError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ReferenceError::Empty);
        }
        let inner: Reference = reference.parse().map_err(|e| ReferenceError::Invalid {
            reference: reference.to_string(),
            reason: format!("{e}"),
        })?;
        Ok(Self { inner })
    }

    /// Registry host, e.g. `docker.io` or `registry.local:5000`.
    pub fn registry(&self) -> &str {
        match self.inner.registry() {
            LEGACY_HUB_REGISTRY => DEFAULT_REGISTRY,
            registry => registry,
        }
    }

    pub fn repository(&self) -> &str {
        self.inner.repository()
    }

    /// Explicit tag, or `latest` when the reference has neither tag nor digest.
    pub fn tag(&self) -> Option<&str> {
        match (self.inner.tag(), self.inner.digest()) {
            (Some(tag), _) => Some(tag),
            (None, None) => Some(DEFAULT_TAG),
            (None, Some(_)) => None,
        }
    }

    pub fn digest(&self) -> Option<&str> {
        self.inner.digest()
    }

    /// `registry/repository`, the image name without tag or digest.
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry(), self.repository())
    }

    /// Value for the pull API's tag parameter; a digest wins over a tag.
    pub fn pull_tag(&self) -> &str {
        self.digest().or(self.tag()).unwrap_or(DEFAULT_TAG)
    }

    /// Key the registry's credentials are stored under in the client config.
    pub fn auth_server(&self) -> &str {
        match self.registry() {
            DEFAULT_REGISTRY => DOCKER_HUB_AUTH_SERVER,
            registry => registry,
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())?;
        if let Some(tag) = self.tag() {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = self.digest() {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
