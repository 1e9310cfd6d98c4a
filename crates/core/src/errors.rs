use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for provenant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for provenant operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad parameter declarations, unknown parameter names and similar setup mistakes
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A record with this uid is already cached
    #[error("a record with uid '{uid}' already exists in the cache")]
    DuplicateRecord { uid: String },

    /// Update of a record the cache does not know about
    #[error("no record with uid '{uid}' exists in the cache")]
    RecordNotFound { uid: String },

    /// Declared required files are absent after dependency resolution
    #[error("{}", format_requirements_error(.instruction, .missing))]
    RequirementsNotMet {
        instruction: String,
        missing: Vec<PathBuf>,
    },

    /// `Cache::get` found nothing
    #[error("no record matches selector {selector}")]
    NoMatch { selector: String },

    /// `Cache::get` found more than one record
    #[error("{count} records match selector {selector}, expected exactly one")]
    AmbiguousMatch { selector: String, count: usize },

    /// Unknown type tag or unregistered type id while decoding
    #[error("unknown data format: {message}")]
    UnknownDataFormat { message: String },

    /// Mutual exclusion could not be acquired in time
    #[error("could not acquire lock '{path}' within {duration:?}")]
    LockTimeout { path: PathBuf, duration: Duration },

    /// Declared created files did not show up in time
    #[error("files {files:?} were not observed within {duration:?}")]
    BarrierTimeout {
        files: Vec<PathBuf>,
        duration: Duration,
    },

    /// Lookup of an instruction name the registry does not know
    #[error("unknown instruction '{name}'")]
    UnknownInstruction { name: String },

    /// The wrapped function body failed
    #[error("instruction '{instruction}' failed: {message}")]
    Execution {
        instruction: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A migration transform failed or did not terminate
    #[error("migration '{migration}' failed: {message}")]
    Migration { migration: String, message: String },

    /// Unsupported operation errors
    #[error("unsupported operation '{operation}': {message}")]
    Unsupported { operation: String, message: String },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

fn format_requirements_error(instruction: &str, missing: &[PathBuf]) -> String {
    let files = missing
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("requirements of '{instruction}' not met, missing files: {files}")
}

// Conversion implementations
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FileSystem {
            path: PathBuf::new(),
            operation: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

// Instruction bodies may bubble up ad-hoc errors with `anyhow`
impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Error::Configuration {
            message: format!("{error:#}"),
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a duplicate record error
    #[must_use]
    pub fn duplicate_record(uid: impl Into<String>) -> Self {
        Error::DuplicateRecord { uid: uid.into() }
    }

    /// Create a record-not-found error
    #[must_use]
    pub fn record_not_found(uid: impl Into<String>) -> Self {
        Error::RecordNotFound { uid: uid.into() }
    }

    /// Create a requirements-not-met error
    #[must_use]
    pub fn requirements_not_met(instruction: impl Into<String>, missing: Vec<PathBuf>) -> Self {
        Error::RequirementsNotMet {
            instruction: instruction.into(),
            missing,
        }
    }

    /// Create a no-match error
    #[must_use]
    pub fn no_match(selector: impl ToString) -> Self {
        Error::NoMatch {
            selector: selector.to_string(),
        }
    }

    /// Create an ambiguous-match error
    #[must_use]
    pub fn ambiguous_match(selector: impl ToString, count: usize) -> Self {
        Error::AmbiguousMatch {
            selector: selector.to_string(),
            count,
        }
    }

    /// Create an unknown-data-format error
    #[must_use]
    pub fn unknown_data_format(message: impl Into<String>) -> Self {
        Error::UnknownDataFormat {
            message: message.into(),
        }
    }

    /// Create a lock timeout error
    #[must_use]
    pub fn lock_timeout(path: impl Into<PathBuf>, duration: Duration) -> Self {
        Error::LockTimeout {
            path: path.into(),
            duration,
        }
    }

    /// Create a barrier timeout error
    #[must_use]
    pub fn barrier_timeout(files: Vec<PathBuf>, duration: Duration) -> Self {
        Error::BarrierTimeout { files, duration }
    }

    /// Create an unknown instruction error
    #[must_use]
    pub fn unknown_instruction(name: impl Into<String>) -> Self {
        Error::UnknownInstruction { name: name.into() }
    }

    /// Create an execution error
    #[must_use]
    pub fn execution(instruction: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Execution {
            instruction: instruction.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an execution error with a source error
    #[must_use]
    pub fn execution_with_source(
        instruction: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Execution {
            instruction: instruction.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a migration error
    #[must_use]
    pub fn migration(migration: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Migration {
            migration: migration.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    #[must_use]
    pub fn unsupported(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Unsupported {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Whether the error is one of the cache lookup misses
    pub fn is_lookup_miss(&self) -> bool {
        matches!(self, Error::NoMatch { .. } | Error::RecordNotFound { .. })
    }
}

// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a lazy message
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_error = e.into();
            Error::Configuration {
                message: format!("{}: {}", message.into(), base_error),
            }
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let base_error = e.into();
            Error::Configuration {
                message: format!("{}: {}", f(), base_error),
            }
        })
    }
}
