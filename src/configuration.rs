//! Composition root for the search layer
//!
//! [`SearchConfiguration::new`] wires the index types, registries, coordinator
//! and composer without touching the cluster. Bringing indexes up to date is
//! a separate awaited step, [`SearchConfiguration::configure_indexes`].

use crate::builders::{
    OrganizationIdQueryBuilder, ProjectIdQueryBuilder, QueryBuilderRegistry,
    StackIdQueryBuilder, SystemFilterQueryBuilder,
};
use crate::composer::{QueryComposer, TermQueryParser};
use crate::config::ElasticsearchSettings;
use crate::error::{ConflictError, Result};
use crate::index::{
    EnsureReport, IndexCoordinator, IndexDefinition, IndexError, SearchEngineClient,
    SearchResults,
};
use crate::indexes::{EventIndex, IndexType, OrganizationIndex, StackIndex};
use crate::macros::MacroRegistry;
use crate::models::QueryContext;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

pub struct SearchConfiguration {
    settings: ElasticsearchSettings,
    index_types: Vec<Arc<dyn IndexType>>,
    coordinator: Arc<IndexCoordinator>,
    composer: QueryComposer,
}

impl SearchConfiguration {
    /// Configure the platform's index types
    pub fn new(
        settings: ElasticsearchSettings,
        client: Arc<dyn SearchEngineClient>,
    ) -> std::result::Result<Self, ConflictError> {
        let index_types: Vec<Arc<dyn IndexType>> = vec![
            Arc::new(StackIndex::new()),
            Arc::new(EventIndex::new()),
            Arc::new(OrganizationIndex::new()),
        ];
        Self::with_index_types(settings, client, index_types)
    }

    pub fn with_index_types(
        settings: ElasticsearchSettings,
        client: Arc<dyn SearchEngineClient>,
        index_types: Vec<Arc<dyn IndexType>>,
    ) -> std::result::Result<Self, ConflictError> {
        info!(
            "All new indexes will be created with {} shards and {} replicas",
            settings.number_of_shards, settings.number_of_replicas
        );

        let mut names = HashSet::new();
        for index_type in &index_types {
            if !names.insert(index_type.name()) {
                return Err(ConflictError::DuplicateIndex(index_type.name().to_string()));
            }
        }

        let mut macros = MacroRegistry::new();
        for source in index_types.iter().filter_map(|index_type| index_type.macros()) {
            macros.configure(source)?;
        }

        let mut builders = QueryBuilderRegistry::new();
        builders.register_defaults()?;
        builders.register(Arc::new(SystemFilterQueryBuilder))?;
        builders.register(Arc::new(OrganizationIdQueryBuilder))?;
        builders.register(Arc::new(ProjectIdQueryBuilder))?;
        builders.register(Arc::new(StackIdQueryBuilder))?;

        let mut coordinator =
            IndexCoordinator::new(client).with_batch_size(settings.reindex_batch_size);
        for index_type in &index_types {
            if let Some(transform) = index_type.migration_transform() {
                coordinator = coordinator.with_transform(index_type.name(), transform);
            }
        }
        let coordinator = Arc::new(coordinator);

        let composer = QueryComposer::new(
            Arc::new(macros),
            Arc::new(builders),
            Arc::new(TermQueryParser::new()),
        )
        .with_coordinator(coordinator.clone());

        Ok(Self {
            settings,
            index_types,
            coordinator,
            composer,
        })
    }

    /// Create missing indexes and, when allowed, migrate outdated ones
    pub async fn configure_indexes(
        &self,
        allow_migration: bool,
    ) -> std::result::Result<EnsureReport, IndexError> {
        self.coordinator
            .ensure_indexes(&self.definitions(), allow_migration)
            .await
    }

    /// Definitions for every configured index type
    pub fn definitions(&self) -> Vec<IndexDefinition> {
        self.index_types
            .iter()
            .map(|index_type| index_type.definition(&self.settings))
            .collect()
    }

    pub fn index_type(&self, name: &str) -> Option<&Arc<dyn IndexType>> {
        self.index_types
            .iter()
            .find(|index_type| index_type.name() == name)
    }

    /// Compose `raw` for `index_type` and run it against the serving index
    pub async fn search(
        &self,
        index_type: &str,
        raw: &str,
        context: &QueryContext,
    ) -> Result<SearchResults> {
        let targeted = self
            .composer
            .compose_targeted(index_type, raw, context)
            .await?;

        let results = self
            .coordinator
            .client()
            .execute(&targeted.query, &targeted.alias)
            .await?;
        Ok(results)
    }

    pub fn settings(&self) -> &ElasticsearchSettings {
        &self.settings
    }

    pub fn composer(&self) -> &QueryComposer {
        &self.composer
    }

    pub fn coordinator(&self) -> &Arc<IndexCoordinator> {
        &self.coordinator
    }
}
