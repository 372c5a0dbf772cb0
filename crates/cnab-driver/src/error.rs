//! Error types for cnab-driver.

use thiserror::Error;

/// Result type alias for cnab-driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Boxed error returned by configuration options.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors reported by a container engine backend.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested object (image, container, path) does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The engine rejected or failed the request
    #[error("engine API error: {0}")]
    Api(String),

    /// A streamed response failed part-way through
    #[error("engine stream error: {0}")]
    Stream(String),

    /// The engine client could not be initialized
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True when the engine reported a missing object.
    ///
    /// Creation uses this to tell "image not present locally" apart from
    /// every other failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors that can occur while running an operation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// No engine was registered and no connector is available
    #[error("no container engine configured")]
    NoEngine,

    /// Creating the engine client failed
    #[error("unable to initialize container engine client: {0}")]
    Connect(#[source] EngineError),

    /// Pulling the invocation image failed
    #[error("failed to pull image '{image}': {source}")]
    Pull {
        /// Image reference that was pulled
        image: String,
        /// Engine failure
        #[source]
        source: EngineError,
    },

    /// A registered configuration option rejected the container spec
    #[error("configuration option failed: {0}")]
    ConfigurationOption(#[source] BoxError),

    /// An input file key is not an absolute in-container path
    #[error("destination path {path} should be an absolute unix path")]
    InvalidPath {
        /// Offending path
        path: String,
    },

    /// The container could not be created
    #[error("cannot create container for image '{image}': {source}")]
    Create {
        /// Image the container was created from
        image: String,
        /// Engine failure
        #[source]
        source: EngineError,
    },

    /// Producing the input archive failed
    #[error("error staging files: {0}")]
    Staging(String),

    /// Copying the input archive into the container failed
    #[error("error copying to / in container: {0}")]
    CopyIn(#[source] EngineError),

    /// Attaching to the container output failed
    #[error("unable to retrieve logs: {0}")]
    Attach(#[source] EngineError),

    /// Starting the container failed
    #[error("cannot start container: {0}")]
    Start(#[source] EngineError),

    /// The wait mechanism itself failed
    #[error("error in container: {0}")]
    Wait(#[source] EngineError),

    /// The container exited with a non-zero status
    #[error("container exit code: {code}{}", exit_message_suffix(.message))]
    Exit {
        /// Exit status reported by the engine
        code: i64,
        /// Optional engine-supplied message
        message: Option<String>,
    },

    /// Copying the outputs directory out of the container failed
    #[error("error copying outputs from container: {0}")]
    CopyOut(#[source] EngineError),

    /// Reading an entry of the outputs archive failed
    #[error("error while reading {path:?} from outputs tar: {source}")]
    OutputEntry {
        /// In-container path of the entry
        path: String,
        /// Read failure
        #[source]
        source: std::io::Error,
    },

    /// The outputs archive could not be iterated
    #[error("error reading outputs archive: {0}")]
    OutputArchive(#[source] std::io::Error),
}

fn exit_message_suffix(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(", message: {message}"),
        None => String::new(),
    }
}
