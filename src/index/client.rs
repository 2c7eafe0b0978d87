//! Search engine collaborator interface

use crate::error::AppError;
use crate::index::definition::IndexDefinition;
use crate::models::StructuredQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors reported by the search engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("index '{0}' already exists")]
    IndexExists(String),

    #[error("index or alias '{0}' not found")]
    IndexNotFound(String),

    #[error("alias '{alias}' points at '{actual}', expected '{expected}'")]
    AliasMismatch {
        alias: String,
        expected: String,
        actual: String,
    },

    #[error("query rejected by engine: {0}")]
    InvalidQuery(String),

    #[error("document transform failed: {0}")]
    Transform(String),

    #[error("search engine unavailable: {0}")]
    Unavailable(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::IndexNotFound(msg) => AppError::NotFound(msg),
            EngineError::InvalidQuery(msg) => AppError::InvalidQuery(msg),
            other => AppError::Engine(other.to_string()),
        }
    }
}

/// Per-document rewrite applied while copying during a reindex
pub trait DocumentTransform: Send + Sync {
    fn transform(&self, document: Value) -> anyhow::Result<Value>;
}

/// Copies documents unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransform;

impl DocumentTransform for IdentityTransform {
    fn transform(&self, document: Value) -> anyhow::Result<Value> {
        Ok(document)
    }
}

/// One batch of a cursor-driven bulk copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCopyRequest {
    /// Resume after this document id; `None` starts from the beginning
    pub after: Option<String>,
    pub batch_size: usize,
    /// Only copy documents written after this write sequence
    #[serde(default)]
    pub changed_since: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCopyPage {
    pub copied: u64,
    /// Cursor for the next batch; `None` once the source is exhausted
    pub next_cursor: Option<String>,
}

/// Search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Physical index that served the request
    pub index: String,
    pub total: u64,
    pub hits: Vec<Value>,
}

/// Operations the coordinator and composer need from the search cluster.
///
/// Connection pooling and transport live behind this trait.
#[async_trait]
pub trait SearchEngineClient: Send + Sync + 'static {
    /// Create a physical index with the definition's mapping and settings
    async fn create_index(&self, name: &str, definition: &IndexDefinition)
        -> Result<(), EngineError>;

    async fn index_exists(&self, name: &str) -> Result<bool, EngineError>;

    /// Physical index names starting with `prefix`
    async fn list_indexes(&self, prefix: &str) -> Result<Vec<String>, EngineError>;

    async fn delete_index(&self, name: &str) -> Result<(), EngineError>;

    /// Physical index the alias currently points at
    async fn get_alias(&self, alias: &str) -> Result<Option<String>, EngineError>;

    /// Atomically repoint `alias` from `from` (or nothing) to `to`
    async fn switch_alias(
        &self,
        alias: &str,
        from: Option<&str>,
        to: &str,
    ) -> Result<(), EngineError>;

    /// Counter bumped by every document write to a physical index
    async fn write_sequence(&self, index: &str) -> Result<u64, EngineError>;

    /// Copy one batch of documents from `source` to `target`
    async fn bulk_copy(
        &self,
        source: &str,
        target: &str,
        request: &BulkCopyRequest,
        transform: &dyn DocumentTransform,
    ) -> Result<BulkCopyPage, EngineError>;

    /// Run a query against an alias or physical index
    async fn execute(
        &self,
        query: &StructuredQuery,
        target: &str,
    ) -> Result<SearchResults, EngineError>;

    /// Insert or replace documents, keyed by their `id` field
    async fn index_documents(&self, target: &str, documents: Vec<Value>)
        -> Result<u64, EngineError>;
}
