//! # cnab-driver
//!
//! Runs CNAB invocation images as ephemeral containers.
//!
//! A [`Driver`] takes an [`Operation`] (image, environment, files), creates
//! one container for it, stages the files, streams the container's output,
//! waits for it to exit, collects whatever it wrote under
//! [`OUTPUTS_DIR`], and removes it again.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   cnab-driver (library)                  │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐   │
//! │  │     Driver      │────▶│  ArchivePlan             │   │
//! │  │  - handles()    │     │  (tar input files)       │   │
//! │  │  - config()     │     └──────────────────────────┘   │
//! │  │  - run()        │     ┌──────────────────────────┐   │
//! │  └─────────────────┘────▶│  LogForwarder            │   │
//! │           │              │  (stdout / stderr sinks) │   │
//! │           │              └──────────────────────────┘   │
//! │           │              ┌──────────────────────────┐   │
//! │           │─────────────▶│  collect_outputs         │   │
//! │           ▼              │  (tar → path map)        │   │
//! │  ┌─────────────────┐     └──────────────────────────┘   │
//! │  │ ContainerEngine │                                    │
//! │  │   (trait)       │                                    │
//! │  └─────────────────┘                                    │
//! │                                                          │
//! └──────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │            cnab-docker (bollard, Docker API)             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use cnab_driver::{Driver, Operation};
//!
//! # async fn example(driver: Driver) {
//! let op = Operation::new("example/hello:v1")
//!     .env("CNAB_ACTION", "install")
//!     .file("/cnab/app/params.json", "{}");
//!
//! let outcome = driver.run(&op).await;
//! for (path, content) in &outcome.result.outputs {
//!     println!("{path}: {content}");
//! }
//! if let Some(e) = outcome.error {
//!     eprintln!("run failed: {e}");
//! }
//! # }
//! ```

mod archive;
mod config;
mod container;
mod driver;
mod engine;
mod error;
mod outputs;
mod streams;
mod types;

pub use archive::{ArchivePlan, ArchiveProducer, ArchiveStream, FILE_MODE};
pub use config::{
    describe as describe_config, DriverSettings, DOCKER_DRIVER_QUIET, OUTPUTS_MOUNT_PATH,
    PULL_ALWAYS, SETTING_KEYS, VERBOSE,
};
pub use container::{
    configuration_option, ConfigurationOption, ContainerSpec, HostSpec, INVOCATION_ENTRYPOINT,
};
pub use driver::{Driver, LOG_DRAIN_TIMEOUT};
pub use engine::{
    ArchiveReader, ConnectOptions, ContainerEngine, ContainerWait, EngineConnector, OutputFrame,
    OutputStream, WaitStatus,
};
pub use error::{BoxError, DriverError, EngineError, Result};
pub use outputs::{collect_outputs, OUTPUTS_DIR};
pub use streams::{output_sink, OutputSink};
pub use types::{Operation, OperationResult, RunOutcome, IMAGE_TYPE_DOCKER, IMAGE_TYPE_OCI};
