//! Error types for query composition

use crate::builders::BuilderError;
use crate::composer::parser::ParseError;
use crate::error::AppError;
use crate::macros::MacroExpansionError;
use serde::Serialize;
use strum::{AsRefStr, Display};

/// Result type for composition
pub type CompositionResult<T> = std::result::Result<T, QueryCompositionError>;

/// Pipeline stage a composition failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CompositionStage {
    MacroExpansion,
    Parse,
    Build,
}

/// Any failure while composing a query, tagged with the failing stage
#[derive(Debug, thiserror::Error)]
pub enum QueryCompositionError {
    #[error("macro expansion failed: {0}")]
    MacroExpansion(#[source] MacroExpansionError),

    #[error("query parsing failed: {0}")]
    Parse(#[source] ParseError),

    #[error("query build failed: {0}")]
    Build(#[source] BuilderError),
}

impl QueryCompositionError {
    pub fn stage(&self) -> CompositionStage {
        match self {
            QueryCompositionError::MacroExpansion(_) => CompositionStage::MacroExpansion,
            QueryCompositionError::Parse(_) => CompositionStage::Parse,
            QueryCompositionError::Build(_) => CompositionStage::Build,
        }
    }

    /// Name of the failing query builder, for build-stage failures
    pub fn contributor(&self) -> Option<&str> {
        match self {
            QueryCompositionError::Build(err) => Some(&err.contributor),
            _ => None,
        }
    }

    /// Bad input from the caller rather than a server defect
    pub fn is_client_error(&self) -> bool {
        !matches!(self, QueryCompositionError::Build(_))
    }
}

impl From<QueryCompositionError> for AppError {
    fn from(err: QueryCompositionError) -> Self {
        match err {
            QueryCompositionError::MacroExpansion(err) => err.into(),
            QueryCompositionError::Parse(err) => err.into(),
            QueryCompositionError::Build(err) => err.into(),
        }
    }
}
