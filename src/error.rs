//! Error types for log_console
//!
//! This module defines the error types used throughout the crate. Most of the
//! capture path never surfaces these: seeding, persistence and stringification
//! failures degrade locally. They are returned by configuration loading and by
//! the explicit persistence calls so callers can inspect what went wrong.

use thiserror::Error;

/// Main error type for log_console operations
#[derive(Error, Debug)]
pub enum LogConsoleError {
    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    ConfigFileMissing(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    /// Invalid file path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Initialization errors
    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// I/O errors (persistence file, config file)
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    /// TOML parsing errors
    #[error("TOML parsing error: {source}")]
    TomlError {
        #[from]
        source: toml::de::Error,
    },

    /// A persisted record that could not be parsed
    #[error("Parse error at line {line}: {reason}")]
    ParseError { line: usize, reason: String },

    /// Tracing subscriber errors
    #[error("Tracing error: {0}")]
    TracingError(String),

    /// Sink-related errors
    #[error("Sink error: {0}")]
    SinkError(String),

    /// Shutdown-related errors
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

/// Result type alias for log_console operations
pub type Result<T> = std::result::Result<T, LogConsoleError>;

impl LogConsoleError {
    /// Create a new parse error
    pub fn parse<S: Into<String>>(line: usize, reason: S) -> Self {
        Self::ParseError {
            line,
            reason: reason.into(),
        }
    }

    /// Create a new tracing error
    pub fn tracing<S: Into<String>>(msg: S) -> Self {
        Self::TracingError(msg.into())
    }

    /// Create a new sink error
    pub fn sink<S: Into<String>>(msg: S) -> Self {
        Self::SinkError(msg.into())
    }

    /// Create a new shutdown error
    pub fn shutdown<S: Into<String>>(msg: S) -> Self {
        Self::ShutdownError(msg.into())
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::IoError { .. } => true,
            Self::ParseError { .. } => true,
            Self::SerializationError { .. } => true,
            Self::SinkError(_) => true,
            Self::InitializationError(_) => false,
            Self::ShutdownError(_) => false,
            _ => false,
        }
    }

    /// Get the error category for logging purposes
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigFileMissing(_)
            | Self::InvalidLogLevel(_)
            | Self::InvalidPath(_) => "config",
            Self::InitializationError(_) => "initialization",
            Self::IoError { .. } => "io",
            Self::SerializationError { .. } => "serialization",
            Self::TomlError { .. } => "toml",
            Self::ParseError { .. } => "parse",
            Self::TracingError(_) => "tracing",
            Self::SinkError(_) => "sink",
            Self::ShutdownError(_) => "shutdown",
        }
    }
}
