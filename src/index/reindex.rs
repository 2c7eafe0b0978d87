//! Reindex task tracking
//!
//! A [`ReindexTask`] follows `Pending -> Running -> {Completed | Failed}`.
//! Terminal tasks are archived and never reopened; a retry creates a fresh
//! task that starts from the failed task's last checkpoint.

use crate::error::{AppError, ConflictError};
use crate::index::client::EngineError;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
pub enum ReindexStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ReindexStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReindexStatus::Completed | ReindexStatus::Failed)
    }

    fn can_transition_to(&self, next: ReindexStatus) -> bool {
        matches!(
            (self, next),
            (ReindexStatus::Pending, ReindexStatus::Running)
                | (ReindexStatus::Running, ReindexStatus::Completed)
                | (ReindexStatus::Running, ReindexStatus::Failed)
        )
    }
}

/// Resume point of a copy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexCheckpoint {
    /// Last document id copied
    pub cursor: Option<String>,
    pub documents_copied: u64,
    /// Source write sequence already covered; later writes are copied
    /// again before the alias switch
    #[serde(default)]
    pub source_sequence: Option<u64>,
}

/// Reindex failures. Recorded on the task and reported to operators; the
/// previous index keeps serving.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("reindex of '{index}' was cancelled")]
    Cancelled { index: String },

    #[error("could not create target index '{index}': {source}")]
    TargetCreate {
        index: String,
        #[source]
        source: EngineError,
    },

    #[error("copy from '{from}' to '{to}' failed: {source}")]
    Copy {
        from: String,
        to: String,
        #[source]
        source: EngineError,
    },

    #[error("switching alias '{alias}' failed: {source}")]
    AliasSwitch {
        alias: String,
        #[source]
        source: EngineError,
    },

    #[error("'{index}' was still being written after {passes} catch-up passes")]
    SourceBusy { index: String, passes: usize },

    #[error("invalid reindex task transition from {from} to {to}")]
    InvalidTransition {
        from: ReindexStatus,
        to: ReindexStatus,
    },
}

impl From<MigrationError> for AppError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::InvalidTransition { .. } => {
                AppError::InvalidStateTransition(err.to_string())
            }
            other => AppError::Migration(other.to_string()),
        }
    }
}

/// Migration of one index definition between two versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexTask {
    pub id: Uuid,
    pub index: String,
    pub source_version: u32,
    pub target_version: u32,
    pub source_index: String,
    pub target_index: String,
    pub status: ReindexStatus,
    pub checkpoint: ReindexCheckpoint,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ReindexTask {
    pub fn new(
        index: impl Into<String>,
        source_version: u32,
        target_version: u32,
        source_index: impl Into<String>,
        target_index: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            index: index.into(),
            source_version,
            target_version,
            source_index: source_index.into(),
            target_index: target_index.into(),
            status: ReindexStatus::Pending,
            checkpoint: ReindexCheckpoint::default(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Start from a previous task's checkpoint
    pub fn resume_from(mut self, checkpoint: ReindexCheckpoint) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    fn transition(&mut self, next: ReindexStatus) -> Result<(), MigrationError> {
        if !self.status.can_transition_to(next) {
            return Err(MigrationError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), MigrationError> {
        self.transition(ReindexStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), MigrationError> {
        self.transition(ReindexStatus::Completed)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), MigrationError> {
        self.transition(ReindexStatus::Failed)?;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
        Ok(())
    }
}

/// Active and archived reindex tasks.
///
/// At most one task per index is active at a time.
#[derive(Default)]
pub struct ReindexTaskStore {
    active: DashMap<String, ReindexTask>,
    history: RwLock<Vec<ReindexTask>>,
}

impl ReindexTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and start a task for `index`.
    ///
    /// Fails with a conflict if a task for the same index is already active.
    /// A task migrating between the same physical indexes as the latest
    /// failed one picks up that task's checkpoint.
    pub fn begin(
        &self,
        index: &str,
        source_version: u32,
        target_version: u32,
        source_index: &str,
        target_index: &str,
    ) -> Result<ReindexTask, ConflictError> {
        match self.active.entry(index.to_string()) {
            Entry::Occupied(entry) => Err(ConflictError::MigrationInProgress {
                index: index.to_string(),
                task_id: entry.get().id,
            }),
            Entry::Vacant(entry) => {
                let mut task = ReindexTask::new(
                    index,
                    source_version,
                    target_version,
                    source_index,
                    target_index,
                );
                if let Some(checkpoint) = self.resumable_checkpoint(source_index, target_index) {
                    task = task.resume_from(checkpoint);
                }

                // A fresh task is always Pending
                task.start().map_err(|_| ConflictError::MigrationInProgress {
                    index: index.to_string(),
                    task_id: task.id,
                })?;

                entry.insert(task.clone());
                Ok(task)
            }
        }
    }

    fn resumable_checkpoint(
        &self,
        source_index: &str,
        target_index: &str,
    ) -> Option<ReindexCheckpoint> {
        self.history
            .read()
            .iter()
            .rev()
            .find(|task| task.source_index == source_index && task.target_index == target_index)
            .filter(|task| task.status == ReindexStatus::Failed)
            .map(|task| task.checkpoint.clone())
    }

    /// Persist progress of the active task for `index`
    pub fn record_checkpoint(&self, index: &str, checkpoint: ReindexCheckpoint) {
        if let Some(mut task) = self.active.get_mut(index) {
            task.checkpoint = checkpoint;
        }
    }

    /// Mark the active task completed and archive it
    pub fn complete(&self, index: &str) -> Result<Option<ReindexTask>, MigrationError> {
        self.finish(index, |task| task.complete())
    }

    /// Mark the active task failed and archive it
    pub fn fail(&self, index: &str, error: &str) -> Result<Option<ReindexTask>, MigrationError> {
        self.finish(index, |task| task.fail(error))
    }

    fn finish(
        &self,
        index: &str,
        close: impl FnOnce(&mut ReindexTask) -> Result<(), MigrationError>,
    ) -> Result<Option<ReindexTask>, MigrationError> {
        let Some((_, mut task)) = self.active.remove(index) else {
            return Ok(None);
        };

        let closed = close(&mut task);
        self.history.write().push(task.clone());
        closed.map(|_| Some(task))
    }

    pub fn active(&self, index: &str) -> Option<ReindexTask> {
        self.active.get(index).map(|task| task.clone())
    }

    /// Archived tasks for `index`, oldest first
    pub fn history(&self, index: &str) -> Vec<ReindexTask> {
        self.history
            .read()
            .iter()
            .filter(|task| task.index == index)
            .cloned()
            .collect()
    }
}
