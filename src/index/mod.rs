//! Index lifecycle
//!
//! Versioned index definitions, the search engine client seam, and the
//! coordinator that creates, migrates and retires physical indexes behind
//! stable aliases.

pub mod client;
pub mod coordinator;
pub mod definition;
pub mod error;
pub mod memory;
pub mod reindex;

pub use client::{
    BulkCopyPage, BulkCopyRequest, DocumentTransform, EngineError, IdentityTransform,
    SearchEngineClient, SearchResults,
};
pub use coordinator::{EnsureReport, IndexCoordinator, IndexOutcome, IndexReport};
pub use definition::IndexDefinition;
pub use error::IndexError;
pub use memory::InMemorySearchEngine;
pub use reindex::{
    MigrationError, ReindexCheckpoint, ReindexStatus, ReindexTask, ReindexTaskStore,
};
