use std::path::PathBuf;

use thiserror::Error;

use crate::identity::IdentifierKind;

/// Errors emitted by the generation engine.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Core(#[from] dicomforge_core::Error),
    #[error(transparent)]
    Plan(#[from] dicomforge_plan::PlanError),
    /// A value was issued twice within one run.
    #[error("identifier collision: {kind} '{value}' was already issued in this run")]
    IdentifierCollision { kind: IdentifierKind, value: String },
    #[error("invalid name catalog: {0}")]
    InvalidCatalog(String),
    #[error("encoding failed for {sop_instance_uid}: {message}")]
    Encode {
        sop_instance_uid: String,
        message: String,
    },
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("worker pool error: {0}")]
    WorkerPool(String),
    #[error("generation panicked: {0}")]
    Panicked(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl GenerationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GenerationError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for generation operations.
pub type Result<T> = std::result::Result<T, GenerationError>;
