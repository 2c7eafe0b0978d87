use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Duplicate registration or concurrent migration
    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// Rejected query (bad macro usage or malformed query text)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Search engine errors
    #[error("Search engine error: {0}")]
    Engine(String),

    /// Reindex failures
    #[error("Migration error: {0}")]
    Migration(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Engine(_) => StatusCode::BAD_GATEWAY,
            AppError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidStateTransition(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Conflict(_) => "CONFLICT",
            AppError::InvalidQuery(_) => "INVALID_QUERY",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Engine(_) => "SEARCH_ENGINE_ERROR",
            AppError::Migration(_) => "MIGRATION_ERROR",
            AppError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller caused this error (as opposed to a server defect)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                error_code = error_code,
                status_code = status.as_u16(),
                message = %message,
                "Request error"
            );
        } else {
            tracing::debug!(
                error_code = error_code,
                status_code = status.as_u16(),
                message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

/// Duplicate registrations and concurrent migrations of the same index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("macro alias '{alias}' is already registered for index type '{index_type}'")]
    DuplicateMacro { index_type: String, alias: String },

    #[error("query builder '{0}' is already registered")]
    DuplicateBuilder(String),

    #[error("index '{0}' is declared more than once")]
    DuplicateIndex(String),

    #[error("reindex task {task_id} is already running for index '{index}'")]
    MigrationInProgress { index: String, task_id: Uuid },
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
