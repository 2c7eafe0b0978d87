use crate::error::ConflictError;
use crate::index::client::{
    BulkCopyRequest, DocumentTransform, EngineError, IdentityTransform, SearchEngineClient,
};
use crate::index::definition::IndexDefinition;
use crate::index::error::IndexError;
use crate::index::reindex::{MigrationError, ReindexCheckpoint, ReindexStatus, ReindexTask, ReindexTaskStore};
use crate::metrics::{INDEXES_CREATED_TOTAL, MIGRATIONS_TOTAL};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// What `ensure_indexes` did (or declined to do) for one definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// The declared version is already serving
    UpToDate { physical: String },

    /// Nothing existed; the declared version was created and aliased
    Created { physical: String },

    /// A physical index existed without an alias and was attached
    Attached { physical: String },

    Migrated {
        from: String,
        to: String,
        documents_copied: u64,
    },

    /// An older version serves and migration is disabled
    Outdated { serving: String, declared_version: u32 },

    /// Reindex failed; the previous index keeps serving
    MigrationFailed {
        task_id: Uuid,
        serving: String,
        error: String,
    },

    /// A newer version than declared already serves
    NewerServing { serving: String, declared_version: u32 },
}

impl IndexOutcome {
    /// Whether the declared version now serves reads
    pub fn is_current(&self) -> bool {
        matches!(
            self,
            IndexOutcome::UpToDate { .. }
                | IndexOutcome::Created { .. }
                | IndexOutcome::Attached { .. }
                | IndexOutcome::Migrated { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: IndexOutcome,
}

/// Per-definition results of an `ensure_indexes` run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnsureReport {
    pub indexes: Vec<IndexReport>,
}

impl EnsureReport {
    pub fn outcome(&self, name: &str) -> Option<&IndexOutcome> {
        self.indexes
            .iter()
            .find(|report| report.name == name)
            .map(|report| &report.outcome)
    }

    /// Indexes not serving their declared version
    pub fn needs_attention(&self) -> Vec<&IndexReport> {
        self.indexes
            .iter()
            .filter(|report| !report.outcome.is_current())
            .collect()
    }
}

/// Creates, versions and migrates physical indexes behind their aliases.
///
/// Reads always go through the alias. A migration builds the new version
/// beside the old one and repoints the alias in one atomic step at the end,
/// so readers never observe a partially copied index. Old versions are
/// retained until [`IndexCoordinator::cleanup_retired`] removes them.
pub struct IndexCoordinator {
    client: Arc<dyn SearchEngineClient>,
    tasks: ReindexTaskStore,
    transforms: HashMap<String, Arc<dyn DocumentTransform>>,
    batch_size: usize,
    cancellation: CancellationToken,
}

impl IndexCoordinator {
    pub const DEFAULT_BATCH_SIZE: usize = 500;
    /// Catch-up passes tried before giving up on a source that keeps changing
    pub const MAX_CATCH_UP_PASSES: usize = 5;

    pub fn new(client: Arc<dyn SearchEngineClient>) -> Self {
        Self {
            client,
            tasks: ReindexTaskStore::new(),
            transforms: HashMap::new(),
            batch_size: Self::DEFAULT_BATCH_SIZE,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Transform applied to every document copied into the declared
    /// version of `index`
    pub fn with_transform(
        mut self,
        index: impl Into<String>,
        transform: Arc<dyn DocumentTransform>,
    ) -> Self {
        self.transforms.insert(index.into(), transform);
        self
    }

    pub fn client(&self) -> &Arc<dyn SearchEngineClient> {
        &self.client
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Bring every definition to its declared version.
    ///
    /// A creation failure aborts the run. Migration failures are recorded on
    /// their task and reported without failing the others.
    pub async fn ensure_indexes(
        &self,
        definitions: &[IndexDefinition],
        allow_migration: bool,
    ) -> Result<EnsureReport, IndexError> {
        let mut seen = HashSet::new();
        for definition in definitions {
            if !seen.insert(definition.name.as_str()) {
                return Err(ConflictError::DuplicateIndex(definition.name.clone()).into());
            }
        }

        let mut report = EnsureReport::default();
        for definition in definitions {
            let outcome = self.ensure_index(definition, allow_migration).await?;
            report.indexes.push(IndexReport {
                name: definition.name.clone(),
                outcome,
            });
        }

        info!(
            indexes = report.indexes.len(),
            needs_attention = report.needs_attention().len(),
            "Index configuration complete"
        );

        Ok(report)
    }

    #[instrument(skip_all, fields(index = %definition.name, version = definition.version))]
    pub async fn ensure_index(
        &self,
        definition: &IndexDefinition,
        allow_migration: bool,
    ) -> Result<IndexOutcome, IndexError> {
        let alias = definition.alias();
        let target = definition.physical_name();

        match self.client.get_alias(alias).await? {
            Some(serving) if serving == target => {
                debug!(physical = %target, "Index is up to date");
                Ok(IndexOutcome::UpToDate { physical: target })
            }
            Some(serving) => self.reconcile(definition, serving, allow_migration).await,
            None => self.bootstrap(definition, allow_migration).await,
        }
    }

    /// Alias exists but points somewhere other than the declared version
    async fn reconcile(
        &self,
        definition: &IndexDefinition,
        serving: String,
        allow_migration: bool,
    ) -> Result<IndexOutcome, IndexError> {
        if let Some(version) = definition.version_of(&serving) {
            if version > definition.version {
                warn!(
                    serving = %serving,
                    declared_version = definition.version,
                    "A newer index version is already serving"
                );
                return Ok(IndexOutcome::NewerServing {
                    serving,
                    declared_version: definition.version,
                });
            }
        }

        if !allow_migration {
            warn!(
                serving = %serving,
                declared_version = definition.version,
                "Index is outdated and migrations are disabled"
            );
            return Ok(IndexOutcome::Outdated {
                serving,
                declared_version: definition.version,
            });
        }

        let task = self.migrate(definition, &serving).await?;
        Ok(Self::migration_outcome(task))
    }

    /// No alias yet: attach an existing physical index or create one
    async fn bootstrap(
        &self,
        definition: &IndexDefinition,
        allow_migration: bool,
    ) -> Result<IndexOutcome, IndexError> {
        let alias = definition.alias();
        let target = definition.physical_name();

        let existing: Vec<(u32, String)> = self
            .client
            .list_indexes(&definition.physical_prefix())
            .await?
            .into_iter()
            .filter_map(|name| definition.version_of(&name).map(|version| (version, name)))
            .collect();

        if existing.iter().any(|(_, name)| *name == target) {
            self.client.switch_alias(alias, None, &target).await?;
            info!(physical = %target, "Attached alias to existing index");
            return Ok(IndexOutcome::Attached { physical: target });
        }

        let newest = existing.into_iter().max_by_key(|(version, _)| *version);
        if let Some((version, newest)) = newest {
            // Keep reads working on whatever exists before deciding anything else
            self.client.switch_alias(alias, None, &newest).await?;
            info!(physical = %newest, "Attached alias to existing index");

            return if version > definition.version {
                Ok(IndexOutcome::NewerServing {
                    serving: newest,
                    declared_version: definition.version,
                })
            } else {
                self.reconcile(definition, newest, allow_migration).await
            };
        }

        self.create(definition).await?;
        self.client
            .switch_alias(alias, None, &target)
            .await
            .map_err(|source| IndexError::CreateFailed {
                index: target.clone(),
                source,
            })?;

        info!(physical = %target, alias = %alias, "Created index");
        Ok(IndexOutcome::Created { physical: target })
    }

    async fn create(&self, definition: &IndexDefinition) -> Result<(), IndexError> {
        let target = definition.physical_name();
        match self.client.create_index(&target, definition).await {
            Ok(()) => {
                INDEXES_CREATED_TOTAL
                    .with_label_values(&[definition.name.as_str()])
                    .inc();
                Ok(())
            }
            Err(EngineError::IndexExists(_)) => Ok(()),
            Err(source) => {
                error!(physical = %target, error = %source, "Failed to create index");
                Err(IndexError::CreateFailed {
                    index: target,
                    source,
                })
            }
        }
    }

    /// Reindex from `source` into the declared version and switch the alias.
    ///
    /// Returns the archived task. A failed copy leaves `source` serving and
    /// the task `Failed` with its last checkpoint; only a concurrent
    /// migration of the same index is returned as an error.
    #[instrument(skip_all, fields(index = %definition.name))]
    pub async fn migrate(
        &self,
        definition: &IndexDefinition,
        source: &str,
    ) -> Result<ReindexTask, IndexError> {
        let target = definition.physical_name();
        let source_version = definition.version_of(source).unwrap_or_default();

        let task = self.tasks.begin(
            &definition.name,
            source_version,
            definition.version,
            source,
            &target,
        )?;

        info!(
            task_id = %task.id,
            source = %source,
            target = %target,
            resume_after = ?task.checkpoint.cursor,
            "Starting reindex"
        );

        let finished = match self.copy_and_switch(definition, &task).await {
            Ok(()) => {
                MIGRATIONS_TOTAL.with_label_values(&["completed"]).inc();
                let finished = self.tasks.complete(&definition.name)?;
                if let Some(task) = &finished {
                    info!(
                        task_id = %task.id,
                        documents_copied = task.checkpoint.documents_copied,
                        "Reindex completed, alias switched"
                    );
                }
                finished
            }
            Err(err) => {
                let outcome = match err {
                    MigrationError::Cancelled { .. } => "cancelled",
                    _ => "failed",
                };
                MIGRATIONS_TOTAL.with_label_values(&[outcome]).inc();
                error!(
                    task_id = %task.id,
                    source = %source,
                    target = %target,
                    error = %err,
                    "Reindex failed, previous index keeps serving"
                );
                self.tasks.fail(&definition.name, &err.to_string())?
            }
        };

        finished.ok_or_else(|| IndexError::NotFound(definition.name.clone()))
    }

    async fn copy_and_switch(
        &self,
        definition: &IndexDefinition,
        task: &ReindexTask,
    ) -> Result<(), MigrationError> {
        let source = task.source_index.as_str();
        let target = task.target_index.as_str();

        let target_exists = self
            .client
            .index_exists(target)
            .await
            .map_err(|source| MigrationError::TargetCreate {
                index: target.to_string(),
                source,
            })?;
        if !target_exists {
            match self.client.create_index(target, definition).await {
                Ok(()) | Err(EngineError::IndexExists(_)) => {}
                Err(source) => {
                    return Err(MigrationError::TargetCreate {
                        index: target.to_string(),
                        source,
                    })
                }
            }
        }

        let identity: Arc<dyn DocumentTransform> = Arc::new(IdentityTransform);
        let transform = self
            .transforms
            .get(&definition.name)
            .cloned()
            .unwrap_or(identity);

        let mut checkpoint: ReindexCheckpoint = task.checkpoint.clone();
        if checkpoint.source_sequence.is_none() {
            checkpoint.source_sequence = Some(self.write_sequence(task).await?);
            self.tasks
                .record_checkpoint(&definition.name, checkpoint.clone());
        }

        self.copy_pass(definition, task, transform.as_ref(), &mut checkpoint, None)
            .await?;

        // Writes that reached the source behind the cursor, including those
        // made between a failed attempt and its retry
        let mut passes = 0;
        loop {
            let covered = checkpoint.source_sequence.unwrap_or_default();
            let observed = self.write_sequence(task).await?;
            if observed <= covered {
                break;
            }
            if passes == Self::MAX_CATCH_UP_PASSES {
                return Err(MigrationError::SourceBusy {
                    index: source.to_string(),
                    passes,
                });
            }
            passes += 1;

            let copied = self
                .copy_pass(
                    definition,
                    task,
                    transform.as_ref(),
                    &mut checkpoint,
                    Some(covered),
                )
                .await?;
            checkpoint.source_sequence = Some(observed);
            self.tasks
                .record_checkpoint(&definition.name, checkpoint.clone());
            info!(pass = passes, copied, "Copied documents written during reindex");
        }

        self.client
            .switch_alias(definition.alias(), Some(source), target)
            .await
            .map_err(|source| MigrationError::AliasSwitch {
                alias: definition.alias().to_string(),
                source,
            })
    }

    /// Copy every document after the checkpoint cursor, or with
    /// `changed_since` every document written after that sequence
    async fn copy_pass(
        &self,
        definition: &IndexDefinition,
        task: &ReindexTask,
        transform: &dyn DocumentTransform,
        checkpoint: &mut ReindexCheckpoint,
        changed_since: Option<u64>,
    ) -> Result<u64, MigrationError> {
        let source = task.source_index.as_str();
        let target = task.target_index.as_str();
        let mut after = match changed_since {
            Some(_) => None,
            None => checkpoint.cursor.clone(),
        };
        let mut copied = 0;

        loop {
            if self.cancellation.is_cancelled() {
                return Err(MigrationError::Cancelled {
                    index: definition.name.clone(),
                });
            }

            let request = BulkCopyRequest {
                after: after.clone(),
                batch_size: self.batch_size,
                changed_since,
            };
            let page = self
                .client
                .bulk_copy(source, target, &request, transform)
                .await
                .map_err(|err| MigrationError::Copy {
                    from: source.to_string(),
                    to: target.to_string(),
                    source: err,
                })?;

            copied += page.copied;
            checkpoint.documents_copied += page.copied;
            let done = page.next_cursor.is_none();
            if let Some(cursor) = page.next_cursor {
                if changed_since.is_none() {
                    checkpoint.cursor = Some(cursor.clone());
                }
                after = Some(cursor);
            }
            self.tasks
                .record_checkpoint(&definition.name, checkpoint.clone());
            debug!(
                copied = checkpoint.documents_copied,
                cursor = ?after,
                "Reindex batch copied"
            );

            if done {
                return Ok(copied);
            }
        }
    }

    async fn write_sequence(&self, task: &ReindexTask) -> Result<u64, MigrationError> {
        self.client
            .write_sequence(&task.source_index)
            .await
            .map_err(|err| MigrationError::Copy {
                from: task.source_index.clone(),
                to: task.target_index.clone(),
                source: err,
            })
    }

    /// Start a fresh task for the most recent failed migration of
    /// `definition`, resuming from its checkpoint
    pub async fn retry_migration(
        &self,
        definition: &IndexDefinition,
    ) -> Result<ReindexTask, IndexError> {
        let failed = self
            .tasks
            .history(&definition.name)
            .into_iter()
            .last()
            .filter(|task| task.status == ReindexStatus::Failed)
            .ok_or_else(|| IndexError::NothingToRetry(definition.name.clone()))?;

        info!(
            index = %definition.name,
            failed_task = %failed.id,
            "Retrying reindex"
        );
        self.migrate(definition, &failed.source_index).await
    }

    /// Physical index currently serving `index_type`
    pub async fn resolve(&self, index_type: &str) -> Result<String, IndexError> {
        self.client
            .get_alias(index_type)
            .await?
            .ok_or_else(|| IndexError::NotFound(index_type.to_string()))
    }

    /// Delete versions older than the serving one.
    ///
    /// Refuses while a migration of the index is running; never touches the
    /// serving index or newer versions.
    pub async fn cleanup_retired(
        &self,
        definition: &IndexDefinition,
    ) -> Result<Vec<String>, IndexError> {
        if let Some(task) = self.tasks.active(&definition.name) {
            return Err(ConflictError::MigrationInProgress {
                index: definition.name.clone(),
                task_id: task.id,
            }
            .into());
        }

        let serving = self.resolve(definition.alias()).await?;
        let Some(serving_version) = definition.version_of(&serving) else {
            return Ok(Vec::new());
        };

        let mut deleted = Vec::new();
        for physical in self
            .client
            .list_indexes(&definition.physical_prefix())
            .await?
        {
            let retired = definition
                .version_of(&physical)
                .is_some_and(|version| version < serving_version);
            if retired && physical != serving {
                self.client.delete_index(&physical).await?;
                info!(index = %definition.name, physical = %physical, "Deleted retired index");
                deleted.push(physical);
            }
        }

        Ok(deleted)
    }

    pub fn active_task(&self, index: &str) -> Option<ReindexTask> {
        self.tasks.active(index)
    }

    /// Archived reindex tasks for `index`, oldest first
    pub fn tasks(&self, index: &str) -> Vec<ReindexTask> {
        self.tasks.history(index)
    }

    /// Stop running migrations at their next batch boundary.
    ///
    /// Cancellation is permanent: later migrations on this coordinator fail
    /// immediately, which is what shutdown wants.
    pub fn cancel_migrations(&self) {
        if !self.cancellation.is_cancelled() {
            info!("Cancelling running migrations");
        }
        self.cancellation.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    fn migration_outcome(task: ReindexTask) -> IndexOutcome {
        match task.status {
            ReindexStatus::Completed => IndexOutcome::Migrated {
                from: task.source_index,
                to: task.target_index,
                documents_copied: task.checkpoint.documents_copied,
            },
            _ => IndexOutcome::MigrationFailed {
                task_id: task.id,
                serving: task.source_index,
                error: task.error.unwrap_or_default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::InMemorySearchEngine;
    use serde_json::{json, Value};

    fn engine() -> Arc<InMemorySearchEngine> {
        Arc::new(InMemorySearchEngine::new())
    }

    async fn seed_v1(engine: &InMemorySearchEngine, documents: usize) {
        let v1 = IndexDefinition::new("events", 1);
        engine.create_index("events-v1", &v1).await.unwrap();
        engine.switch_alias("events", None, "events-v1").await.unwrap();
        let documents: Vec<Value> = (0..documents)
            .map(|i| json!({ "id": format!("e{:03}", i), "message": "boom" }))
            .collect();
        engine.index_documents("events", documents).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_then_up_to_date() {
        let engine = engine();
        let coordinator = IndexCoordinator::new(engine.clone());
        let definitions = [IndexDefinition::new("events", 1), IndexDefinition::new("stacks", 2)];

        let first = coordinator.ensure_indexes(&definitions, false).await.unwrap();
        assert_eq!(
            first.outcome("stacks"),
            Some(&IndexOutcome::Created {
                physical: "stacks-v2".to_string()
            })
        );

        let second = coordinator.ensure_indexes(&definitions, false).await.unwrap();
        assert!(second
            .indexes
            .iter()
            .all(|report| matches!(report.outcome, IndexOutcome::UpToDate { .. })));
        assert_eq!(coordinator.resolve("events").await.unwrap(), "events-v1");
    }

    #[tokio::test]
    async fn test_duplicate_definitions_rejected() {
        let coordinator = IndexCoordinator::new(engine());
        let definitions = [IndexDefinition::new("events", 1), IndexDefinition::new("events", 2)];

        let err = coordinator.ensure_indexes(&definitions, true).await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::Conflict(ConflictError::DuplicateIndex(name)) if name == "events"
        ));
    }

    #[tokio::test]
    async fn test_migration_switches_alias_and_keeps_old_index() {
        let engine = engine();
        seed_v1(&engine, 7).await;
        let coordinator = IndexCoordinator::new(engine.clone()).with_batch_size(3);

        let outcome = coordinator
            .ensure_index(&IndexDefinition::new("events", 2), true)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            IndexOutcome::Migrated {
                from: "events-v1".to_string(),
                to: "events-v2".to_string(),
                documents_copied: 7,
            }
        );
        assert_eq!(coordinator.resolve("events").await.unwrap(), "events-v2");
        assert_eq!(engine.document_count("events-v1"), 7);
        assert_eq!(engine.document_count("events-v2"), 7);
        assert_eq!(coordinator.tasks("events").len(), 1);
        assert!(coordinator.active_task("events").is_none());
    }

    #[tokio::test]
    async fn test_newer_version_is_left_alone() {
        let engine = engine();
        let v3 = IndexDefinition::new("events", 3);
        engine.create_index("events-v3", &v3).await.unwrap();
        engine.switch_alias("events", None, "events-v3").await.unwrap();

        let coordinator = IndexCoordinator::new(engine.clone());
        let outcome = coordinator
            .ensure_index(&IndexDefinition::new("events", 2), true)
            .await
            .unwrap();

        assert!(matches!(outcome, IndexOutcome::NewerServing { declared_version: 2, .. }));
        assert!(!engine.index_exists("events-v2").await.unwrap());
    }

    #[tokio::test]
    async fn test_unaliased_index_is_attached() {
        let engine = engine();
        let v1 = IndexDefinition::new("events", 1);
        engine.create_index("events-v1", &v1).await.unwrap();

        let coordinator = IndexCoordinator::new(engine.clone());
        let outcome = coordinator.ensure_index(&v1, false).await.unwrap();

        assert_eq!(
            outcome,
            IndexOutcome::Attached {
                physical: "events-v1".to_string()
            }
        );
        assert_eq!(coordinator.resolve("events").await.unwrap(), "events-v1");
    }

    #[tokio::test]
    async fn test_cancelled_migration_keeps_old_index_serving() {
        let engine = engine();
        seed_v1(&engine, 4).await;
        let coordinator = IndexCoordinator::new(engine.clone());
        coordinator.cancel_migrations();

        let outcome = coordinator
            .ensure_index(&IndexDefinition::new("events", 2), true)
            .await
            .unwrap();

        match outcome {
            IndexOutcome::MigrationFailed { serving, error, .. } => {
                assert_eq!(serving, "events-v1");
                assert!(error.contains("cancelled"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(coordinator.resolve("events").await.unwrap(), "events-v1");
    }

    #[tokio::test]
    async fn test_retry_without_failure() {
        let coordinator = IndexCoordinator::new(engine());
        let err = coordinator
            .retry_migration(&IndexDefinition::new("events", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NothingToRetry(_)));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_serving_index() {
        let engine = engine();
        seed_v1(&engine, 2).await;
        let coordinator = IndexCoordinator::new(engine.clone());
        let v2 = IndexDefinition::new("events", 2);
        coordinator.ensure_index(&v2, true).await.unwrap();

        let deleted = coordinator.cleanup_retired(&v2).await.unwrap();

        assert_eq!(deleted, vec!["events-v1".to_string()]);
        assert!(engine.index_exists("events-v2").await.unwrap());
        assert_eq!(coordinator.resolve("events").await.unwrap(), "events-v2");
        assert!(coordinator.cleanup_retired(&v2).await.unwrap().is_empty());
    }
}
