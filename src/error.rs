//! Startup error types.
//!
//! Errors raised while serving requests live in [`crate::mcp::error`]; the
//! types here only occur before the listener is bound.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to assemble the runtime configuration or the widget asset.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but reading it failed.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// File that was being read.
        path: PathBuf,
        /// Cause.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or has unknown keys.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// File that was being parsed.
        path: PathBuf,
        /// Cause, including line and column.
        #[source]
        source: serde_json::Error,
    },

    /// An explicitly named file does not exist.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path given on the command line.
        path: PathBuf,
    },

    /// A value is out of range or inconsistent.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Which setting and why.
        message: String,
    },

    /// An environment override could not be parsed.
    #[error("invalid value for environment variable {name}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },

    /// The widget file could not be read.
    #[error("failed to read widget file: {path}")]
    WidgetRead {
        /// Path to the widget file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The widget file is empty.
    #[error("widget file is empty: {path}")]
    WidgetEmpty {
        /// Path to the widget file.
        path: PathBuf,
    },
}
