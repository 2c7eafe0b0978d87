//! Error types for macro expansion

use crate::error::AppError;

/// A registered macro rejected its input.
///
/// This is caused by the query text, so it is reported to the caller as a
/// rejected query rather than a server fault.
#[derive(Debug, thiserror::Error)]
#[error("macro '{alias}' could not expand '{token}': {message}")]
pub struct MacroExpansionError {
    pub index_type: String,
    pub alias: String,
    pub token: String,
    pub message: String,
}

impl From<MacroExpansionError> for AppError {
    fn from(err: MacroExpansionError) -> Self {
        AppError::InvalidQuery(err.to_string())
    }
}
