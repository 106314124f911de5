//! Structured error handling for the synthesis service
//!
//! One error enum covers ingress validation, voice loading, engine calls and
//! session lifecycle. Errors are `Clone` so a single failed voice load can be
//! reported to every request that was waiting on it.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias with TtsError
pub type Result<T> = std::result::Result<T, TtsError>;

/// Main error type
#[derive(Error, Debug, Clone)]
pub enum TtsError {
    /// A request parameter is missing, malformed or out of range
    #[error("Invalid parameter '{field}': {message}")]
    InvalidParameter { field: String, message: String },

    /// Voice id is not part of the catalog
    #[error("Unsupported voice '{voice}' (available: {available})")]
    UnsupportedVoice { voice: String, available: String },

    /// Voice model could not be loaded
    #[error("Failed to load voice {voice}: {message}")]
    ModelLoad {
        voice: String,
        message: String,
        path: Option<PathBuf>,
    },

    /// Engine inference failed
    #[error("Engine error: {message}")]
    Engine {
        message: String,
        segment: Option<usize>,
        recoverable: bool,
    },

    /// Session deadline elapsed
    #[error("Synthesis timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Consumer went away before the session finished
    #[error("Synthesis cancelled")]
    Cancelled,

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
    },

    /// Internal/bug errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TtsError {
    /// Invalid request parameter
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        TtsError::InvalidParameter {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Engine failure, optionally worth one retry
    pub fn engine(message: impl Into<String>, recoverable: bool) -> Self {
        TtsError::Engine {
            message: message.into(),
            segment: None,
            recoverable,
        }
    }

    pub fn model_load(voice: impl ToString, message: impl Into<String>) -> Self {
        TtsError::ModelLoad {
            voice: voice.to_string(),
            message: message.into(),
            path: None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        TtsError::Config {
            message: message.into(),
            path: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        TtsError::Internal {
            message: message.into(),
        }
    }

    /// Attach the segment index to an engine error
    pub fn at_segment(self, index: usize) -> Self {
        match self {
            TtsError::Engine {
                message,
                recoverable,
                ..
            } => TtsError::Engine {
                message,
                segment: Some(index),
                recoverable,
            },
            other => other,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            TtsError::InvalidParameter { .. } => "invalid_parameter",
            TtsError::UnsupportedVoice { .. } => "unsupported_voice",
            TtsError::ModelLoad { .. } => "model_load_error",
            TtsError::Engine { .. } => "engine_error",
            TtsError::Timeout { .. } => "timeout",
            TtsError::Cancelled => "cancelled",
            TtsError::Config { .. } => "config_error",
            TtsError::Io { .. } => "io_error",
            TtsError::Internal { .. } => "internal_error",
        }
    }

    /// Whether a failed engine call may be attempted once more
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TtsError::Engine {
                recoverable: true,
                ..
            }
        )
    }

    /// True for errors caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TtsError::InvalidParameter { .. } | TtsError::UnsupportedVoice { .. }
        )
    }
}

impl From<std::io::Error> for TtsError {
    fn from(err: std::io::Error) -> Self {
        TtsError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for TtsError {
    fn from(err: serde_json::Error) -> Self {
        TtsError::Config {
            message: format!("invalid JSON: {}", err),
            path: None,
        }
    }
}

impl From<serde_yaml::Error> for TtsError {
    fn from(err: serde_yaml::Error) -> Self {
        TtsError::Config {
            message: format!("invalid YAML: {}", err),
            path: None,
        }
    }
}

impl From<hound::Error> for TtsError {
    fn from(err: hound::Error) -> Self {
        TtsError::Internal {
            message: format!("WAV encoding failed: {}", err),
        }
    }
}
