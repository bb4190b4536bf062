//! Error types for the inference engine.
//!
//! None of these escape the engine's public inference calls: every tier
//! converts a failure into "no information" and falls through. They exist so
//! the individual components can say *why* they gave up, which ends up in the
//! debug log.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferError {
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("cannot resolve type `{name}`")]
    UnresolvedType { name: String },

    #[error("no shape pattern for `{expression}`")]
    UnsupportedShape { expression: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl InferError {
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        InferError::Parse { path: path.into(), message: message.into() }
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        InferError::UnresolvedType { name: name.into() }
    }

    pub fn unsupported(expression: impl Into<String>) -> Self {
        InferError::UnsupportedShape { expression: expression.into() }
    }
}

pub type Result<T, E = InferError> = std::result::Result<T, E>;
