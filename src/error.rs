//! Error handling module for commander
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Script loading, step decoding and action failures all surface as
//! [`CommanderError`] so the interpreter loop can log and stop uniformly.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for commander
#[derive(Error, Debug)]
pub enum CommanderError {
    /// Script file unreadable or not a list of operation objects
    #[error("Could not load script {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// An operation record could not be decoded
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// An operation's side effect failed
    #[error("{operation} failed: {message}")]
    Action { operation: String, message: String },

    /// Configuration errors (config file, CLI values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid execution state transition
    #[error("State error: {0}")]
    State(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for commander operations
pub type Result<T> = std::result::Result<T, CommanderError>;

/// Problems with a single operation record, found when the script is loaded.
///
/// The loader keeps these on the step instead of failing the whole script;
/// the interpreter raises them when it reaches the step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// The `operation` tag names no known operation
    #[error("Command not found: {0}")]
    UnknownOperation(String),

    /// A required field is absent (or null)
    #[error("{operation}: {field} field could not be found")]
    MissingField {
        operation: String,
        field: &'static str,
    },

    /// A field is present but has the wrong type
    #[error("{operation}: invalid record: {reason}")]
    InvalidField { operation: String, reason: String },
}

// Convenient error constructors
impl CommanderError {
    /// Create a script load error
    pub fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an action error for the given operation
    pub fn action(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Action {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }
}
