use crate::error::{AppError, ConflictError};
use crate::index::client::EngineError;
use crate::index::reindex::MigrationError;
use thiserror::Error;

/// Index coordinator errors
#[derive(Error, Debug)]
pub enum IndexError {
    /// A declared index could not be created; startup cannot continue
    #[error("failed to create index '{index}': {source}")]
    CreateFailed {
        index: String,
        #[source]
        source: EngineError,
    },

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("no index is serving '{0}'")]
    NotFound(String),

    #[error("no failed migration to retry for '{0}'")]
    NothingToRetry(String),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Conflict(conflict) => AppError::Conflict(conflict),
            IndexError::NotFound(alias) => AppError::NotFound(format!("index '{}'", alias)),
            IndexError::NothingToRetry(_) => AppError::InvalidStateTransition(err.to_string()),
            IndexError::Migration(migration) => migration.into(),
            IndexError::Engine(engine) => engine.into(),
            IndexError::CreateFailed { .. } => AppError::Configuration(err.to_string()),
        }
    }
}
