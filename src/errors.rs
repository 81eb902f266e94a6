use std::path::PathBuf;
use thiserror::Error;

/// Failures while finding a device for a sensor kind
#[derive(Error, Debug)]
pub enum LocateError {
    #[error("No IIO device with type name '{kind}' found")]
    NoSuchDevice { kind: String },

    #[error("Failed to enumerate IIO devices under '{}': {source}", .root.display())]
    EnumerationFailed {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Device calibration unusable: {0}")]
    Calibration(#[from] ConfigError),
}

/// Attribute file I/O errors
#[derive(Error, Debug)]
pub enum IoError {
    #[error("Failed to open '{}': {source}", .path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{}': {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Attribute value parse errors. These never abort setup on their own;
/// the caller decides whether the affected value is required.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Attribute '{name}' is not a number: '{value}'")]
    NotANumber { name: String, value: String },

    #[error("Unknown storage type '{tag}' in '{}'", .path.display())]
    UnknownTypeTag { path: PathBuf, tag: String },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Device '{device}' has no usable scale attribute")]
    MissingScale { device: String },

    #[error("Device '{device}' reports a zero scale")]
    ZeroScale { device: String },

    #[error("Cannot derive a sensor kind from '{id}'")]
    UnknownSensorKind { id: String },

    #[error("Failed to load configuration from '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration format: {0}")]
    FormatError(#[from] toml::de::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Adaptor lifecycle errors
#[derive(Error, Debug)]
pub enum AdaptorError {
    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot {operation} while adaptor is {state}")]
    InvalidState {
        state: &'static str,
        operation: &'static str,
    },
}

/// Result type aliases for convenience
pub type LocateResult<T> = Result<T, LocateError>;
pub type IoResult<T> = Result<T, IoError>;
pub type ParseResult<T> = Result<T, ParseError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type AdaptorResult<T> = Result<T, AdaptorError>;
