//! # cnab-docker
//!
//! Docker backend for [`cnab_driver`], built on bollard.
//!
//! ```ignore
//! let driver = cnab_docker::driver();
//! let outcome = driver.run(&cnab_driver::Operation::new("example/install:v1")).await;
//! ```
//!
//! The client connects on the first run. Images missing locally are pulled
//! with credentials from the Docker client config (`$DOCKER_CONFIG` or
//! `~/.docker`); pull progress and notices go to the process stdout and
//! stderr unless `DOCKER_DRIVER_QUIET=1`.

mod auth;
mod connector;
mod console;
mod engine;
mod reference;

pub use auth::{default_config_dir, resolve_credentials, AuthError};
pub use connector::DockerConnector;
pub use console::{progress_line, Console};
pub use engine::DockerEngine;
pub use reference::{ImageReference, ReferenceError, DEFAULT_REGISTRY, DOCKER_HUB_AUTH_SERVER};

use cnab_driver::Driver;
use std::sync::Arc;

/// A driver that runs invocation images on the local Docker daemon.
pub fn driver() -> Driver {
    Driver::new(Arc::new(DockerConnector::new()))
}
