use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure categories that cross the synthesis worker boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Model or voice table could not be fetched or parsed.
    LoadFailure,
    /// Voice table loaded but holds no entries.
    NoVoicesAvailable,
    /// Inference runtime rejected the request.
    SynthesisFailure,
    /// A synthesis request arrived before a successful load.
    NotLoaded,
}

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("load failure: {0}")]
    LoadFailure(String),

    #[error("no voices available")]
    NoVoicesAvailable,

    #[error("synthesis failure: {0}")]
    SynthesisFailure(String),

    #[error("engine not loaded")]
    NotLoaded,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::LoadFailure(_) => ErrorKind::LoadFailure,
            EngineError::NoVoicesAvailable => ErrorKind::NoVoicesAvailable,
            EngineError::SynthesisFailure(_) => ErrorKind::SynthesisFailure,
            EngineError::NotLoaded => ErrorKind::NotLoaded,
        }
    }
}

/// Structured error message posted across a domain boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<&EngineError> for ErrorReport {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

impl From<EngineError> for ErrorReport {
    fn from(err: EngineError) -> Self {
        ErrorReport::from(&err)
    }
}

/// Phonemizer failures. Always recoverable: the encoder falls back to the
/// rule-based approximation.
#[derive(Debug, Error)]
pub enum PhonemizeError {
    #[error("failed to run phonemizer '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("phonemizer '{program}' exited with error: {stderr}")]
    Failed { program: String, stderr: String },

    #[error("phonemizer produced no output")]
    Empty,
}
