use crate::builders::QueryBuilderRegistry;
use crate::composer::error::{CompositionResult, QueryCompositionError};
use crate::composer::parser::QueryParser;
use crate::error::{AppError, Result};
use crate::index::IndexCoordinator;
use crate::macros::MacroRegistry;
use crate::metrics::{QUERIES_COMPOSED_TOTAL, QUERY_COMPOSITION_FAILURES_TOTAL};
use crate::models::{QueryContext, StructuredQuery};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// A composed query together with the index it should run against
#[derive(Debug, Clone, Serialize)]
pub struct TargetedQuery {
    pub index_type: String,

    /// Logical alias to execute against
    pub alias: String,

    /// Physical index currently behind the alias
    pub physical_index: String,

    pub query: StructuredQuery,
}

/// Expands macros, parses, and runs the query builder chain for one request.
///
/// Holds only shared read-only registries, so one composer serves all
/// concurrent requests.
#[derive(Clone)]
pub struct QueryComposer {
    macros: Arc<MacroRegistry>,
    builders: Arc<QueryBuilderRegistry>,
    parser: Arc<dyn QueryParser>,
    coordinator: Option<Arc<IndexCoordinator>>,
}

impl QueryComposer {
    pub fn new(
        macros: Arc<MacroRegistry>,
        builders: Arc<QueryBuilderRegistry>,
        parser: Arc<dyn QueryParser>,
    ) -> Self {
        Self {
            macros,
            builders,
            parser,
            coordinator: None,
        }
    }

    /// Resolve target indexes through the given coordinator
    pub fn with_coordinator(mut self, coordinator: Arc<IndexCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn macros(&self) -> &MacroRegistry {
        &self.macros
    }

    pub fn builders(&self) -> &QueryBuilderRegistry {
        &self.builders
    }

    /// Compose the structured query for `raw` against `index_type`
    #[instrument(skip_all, fields(index_type = %index_type))]
    pub fn compose(
        &self,
        index_type: &str,
        raw: &str,
        context: &QueryContext,
    ) -> CompositionResult<StructuredQuery> {
        let result = self.compose_stages(index_type, raw, context);

        match &result {
            Ok(query) => {
                QUERIES_COMPOSED_TOTAL.with_label_values(&[index_type]).inc();
                debug!(filters = query.filters().len(), "Query composed");
            }
            Err(err) => {
                QUERY_COMPOSITION_FAILURES_TOTAL
                    .with_label_values(&[index_type, err.stage().as_ref()])
                    .inc();
                if err.is_client_error() {
                    debug!(stage = %err.stage(), error = %err, "Query rejected");
                } else {
                    error!(
                        stage = %err.stage(),
                        contributor = err.contributor().unwrap_or_default(),
                        error = %err,
                        "Query composition failed"
                    );
                }
            }
        }

        result
    }

    fn compose_stages(
        &self,
        index_type: &str,
        raw: &str,
        context: &QueryContext,
    ) -> CompositionResult<StructuredQuery> {
        let expanded = self
            .macros
            .expand(index_type, raw)
            .map_err(QueryCompositionError::MacroExpansion)?;

        let base = self
            .parser
            .parse(&expanded)
            .map_err(QueryCompositionError::Parse)?;

        self.builders
            .build(StructuredQuery::new(base), context)
            .map_err(QueryCompositionError::Build)
    }

    /// Compose and resolve the physical index serving `index_type`
    pub async fn compose_targeted(
        &self,
        index_type: &str,
        raw: &str,
        context: &QueryContext,
    ) -> Result<TargetedQuery> {
        let coordinator = self.coordinator.as_ref().ok_or_else(|| {
            AppError::Configuration("query composer has no index coordinator".to_string())
        })?;

        let query = self.compose(index_type, raw, context)?;
        let physical_index = coordinator.resolve(index_type).await?;

        Ok(TargetedQuery {
            index_type: index_type.to_string(),
            alias: index_type.to_string(),
            physical_index,
            query,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{
        OrganizationIdQueryBuilder, ProjectIdQueryBuilder, QueryBuilder, StackIdQueryBuilder,
        SystemFilterQueryBuilder,
    };
    use crate::composer::{CompositionStage, TermQueryParser};
    use crate::models::Clause;

    fn composer() -> QueryComposer {
        let mut macros = MacroRegistry::new();
        macros
            .register_replacement("stacks", "is:fixed", "status:fixed")
            .unwrap();

        let mut builders = QueryBuilderRegistry::new();
        let scope: [Arc<dyn QueryBuilder>; 4] = [
            Arc::new(SystemFilterQueryBuilder),
            Arc::new(OrganizationIdQueryBuilder),
            Arc::new(ProjectIdQueryBuilder),
            Arc::new(StackIdQueryBuilder),
        ];
        for builder in scope {
            builders.register(builder).unwrap();
        }

        QueryComposer::new(
            Arc::new(macros),
            Arc::new(builders),
            Arc::new(TermQueryParser::new()),
        )
    }

    #[test]
    fn test_compose_expands_then_filters() {
        let context = QueryContext::new()
            .with_organization("org1")
            .with_project("")
            .with_stack("");

        let query = composer().compose("stacks", "is:fixed", &context).unwrap();

        assert_eq!(query.base(), Some(&Clause::term("status", "fixed")));
        assert_eq!(
            query.term_clauses(),
            vec![("status", "fixed"), ("organization", "org1")]
        );
    }

    #[test]
    fn test_parse_failure_is_tagged() {
        let err = composer()
            .compose("stacks", "status:", &QueryContext::new())
            .unwrap_err();

        assert_eq!(err.stage(), CompositionStage::Parse);
        assert!(err.is_client_error());
        assert_eq!(err.contributor(), None);
    }

    #[tokio::test]
    async fn test_compose_targeted_requires_coordinator() {
        let err = composer()
            .compose_targeted("stacks", "", &QueryContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Configuration(_)));
    }
}
