use std::path::PathBuf;

use thiserror::Error;

/// Errors emitted by the verification engine.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid tree: {0}")]
    InvalidTree(String),
    #[error("cannot decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },
    #[error("verification failed with {0} violation(s)")]
    Violations(u64),
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EvalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EvalError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EvalError>;
