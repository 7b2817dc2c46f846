//! Error types for the data access layer.

use std::error::Error as StdError;

use thiserror::Error;

/// Boxed driver error kept as the source of a [`DalError`].
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Main error type for data access operations.
///
/// Absent or NULL columns during materialization are not errors: the field
/// keeps its default value.
#[derive(Error, Debug)]
pub enum DalError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Opening a connection to the backend failed
    #[error("Connection error ({backend}): {source}")]
    Connection {
        backend: String,
        #[source]
        source: BoxError,
    },

    /// The command text or its parameters could not be turned into a command
    #[error("Command build error: {0}")]
    CommandBuild(String),

    /// The driver reported a failure while executing a command
    #[error("Execution failed ({backend}): {source}\n  Command: {command}")]
    Execution {
        backend: String,
        command: String,
        #[source]
        source: BoxError,
    },

    /// A value could not be written into a record field
    #[error("Cannot map {found} value into field '{field}' of type {expected}")]
    Mapping {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The backend does not implement the requested operation
    #[error("Operation '{operation}' is not supported by the {backend} provider")]
    Unsupported { backend: String, operation: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DalError {
    /// Create a Connection error for a backend.
    ///
    /// `source` is the driver error, or a plain message.
    pub fn connection(backend: impl Into<String>, source: impl Into<BoxError>) -> Self {
        DalError::Connection {
            backend: backend.into(),
            source: source.into(),
        }
    }

    /// Create an Execution error carrying the failing command text.
    pub fn execution(
        backend: impl Into<String>,
        command: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        DalError::Execution {
            backend: backend.into(),
            command: command.into(),
            source: source.into(),
        }
    }

    /// Create an Unsupported error.
    pub fn unsupported(backend: impl Into<String>, operation: impl Into<String>) -> Self {
        DalError::Unsupported {
            backend: backend.into(),
            operation: operation.into(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            DalError::Config(_) | DalError::Yaml(_) => 2,
            DalError::Connection { .. } => 3,
            DalError::CommandBuild(_) | DalError::Execution { .. } => 4,
            DalError::Mapping { .. } => 5,
            DalError::Unsupported { .. } => 6,
            DalError::Io(_) | DalError::Json(_) => 1,
        }
    }

    /// Format error with full details including error chain.
    ///
    /// Causes whose text already appears above are skipped.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = StdError::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            let text = err.to_string();
            if !output.contains(&text) {
                output.push_str(&format!("\nCaused by:\n  {}: {}", depth, text));
                depth += 1;
            }
            source = err.source();
        }

        output
    }
}

/// Result type alias for data access operations.
pub type Result<T> = std::result::Result<T, DalError>;
