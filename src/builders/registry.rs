use crate::builders::contributors::DateRangeQueryBuilder;
use crate::error::{AppError, ConflictError};
use crate::models::{Clause, QueryContext, StructuredQuery};
use std::sync::Arc;
use tracing::{debug, error};

/// A single filter concern in the query builder chain.
///
/// Builders see the request context and the query built so far and return at
/// most one clause. They must not keep per-call state: the same instance runs
/// concurrently for every in-flight request.
pub trait QueryBuilder: Send + Sync + 'static {
    /// Unique builder name
    fn name(&self) -> &str;

    /// Clause to AND into the query, if this builder applies
    fn contribute(
        &self,
        query: &StructuredQuery,
        context: &QueryContext,
    ) -> anyhow::Result<Option<Clause>>;
}

/// A query builder failed while composing a query.
///
/// Builders only fail on programming or registration defects, so this maps to
/// an internal error.
#[derive(Debug, thiserror::Error)]
#[error("query builder '{contributor}' failed: {source}")]
pub struct BuilderError {
    pub contributor: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl From<BuilderError> for AppError {
    fn from(err: BuilderError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Ordered chain of query builders.
///
/// Insertion order is execution order. The registry is filled during startup
/// and then shared read-only.
#[derive(Default)]
pub struct QueryBuilderRegistry {
    builders: Vec<Arc<dyn QueryBuilder>>,
}

impl QueryBuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a builder to the chain
    pub fn register(&mut self, builder: Arc<dyn QueryBuilder>) -> Result<(), ConflictError> {
        if self.contains(builder.name()) {
            return Err(ConflictError::DuplicateBuilder(builder.name().to_string()));
        }

        debug!(
            builder = builder.name(),
            position = self.builders.len(),
            "Registered query builder"
        );
        self.builders.push(builder);
        Ok(())
    }

    /// Register the builders every index type gets
    pub fn register_defaults(&mut self) -> Result<(), ConflictError> {
        self.register(Arc::new(DateRangeQueryBuilder))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.iter().any(|builder| builder.name() == name)
    }

    /// Builder names in execution order
    pub fn names(&self) -> Vec<&str> {
        self.builders.iter().map(|builder| builder.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Run every builder in order against `base`.
    ///
    /// Clauses are only ever appended. If any builder fails the whole build
    /// fails and nothing is returned.
    pub fn build(
        &self,
        base: StructuredQuery,
        context: &QueryContext,
    ) -> Result<StructuredQuery, BuilderError> {
        let mut query = base;

        for builder in &self.builders {
            match builder.contribute(&query, context) {
                Ok(Some(clause)) => {
                    debug!(builder = builder.name(), ?clause, "Query builder added clause");
                    query.push_filter(builder.name(), clause);
                }
                Ok(None) => {}
                Err(err) => {
                    error!(
                        builder = builder.name(),
                        error = %format!("{err:#}"),
                        ?context,
                        "Query builder failed"
                    );
                    return Err(BuilderError {
                        contributor: builder.name().to_string(),
                        source: err.into(),
                    });
                }
            }
        }

        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::OrganizationIdQueryBuilder;

    struct StaticBuilder {
        name: &'static str,
        clause: Option<Clause>,
    }

    impl QueryBuilder for StaticBuilder {
        fn name(&self) -> &str {
            self.name
        }

        fn contribute(
            &self,
            _query: &StructuredQuery,
            _context: &QueryContext,
        ) -> anyhow::Result<Option<Clause>> {
            Ok(self.clause.clone())
        }
    }

    struct FailingBuilder;

    impl QueryBuilder for FailingBuilder {
        fn name(&self) -> &str {
            "failing"
        }

        fn contribute(
            &self,
            _query: &StructuredQuery,
            _context: &QueryContext,
        ) -> anyhow::Result<Option<Clause>> {
            anyhow::bail!("field mapping missing")
        }
    }

    #[test]
    fn test_duplicate_names_conflict() {
        let mut registry = QueryBuilderRegistry::new();
        registry
            .register(Arc::new(OrganizationIdQueryBuilder))
            .unwrap();

        let err = registry
            .register(Arc::new(OrganizationIdQueryBuilder))
            .unwrap_err();
        assert_eq!(
            err,
            ConflictError::DuplicateBuilder("organization".to_string())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_build_appends_in_registration_order() {
        let mut registry = QueryBuilderRegistry::new();
        for (name, value) in [("first", Some("1")), ("skipped", None), ("second", Some("2"))] {
            registry
                .register(Arc::new(StaticBuilder {
                    name,
                    clause: value.map(|v| Clause::term("field", v)),
                }))
                .unwrap();
        }

        let base = StructuredQuery::new(Some(Clause::term("status", "open")));
        let query = registry.build(base, &QueryContext::new()).unwrap();

        let contributors: Vec<&str> = query
            .filters()
            .iter()
            .map(|filter| filter.contributor.as_str())
            .collect();
        assert_eq!(contributors, vec!["first", "second"]);
        assert_eq!(query.base(), Some(&Clause::term("status", "open")));
        assert_eq!(registry.names(), vec!["first", "skipped", "second"]);
    }

    #[test]
    fn test_failing_builder_names_contributor() {
        let mut registry = QueryBuilderRegistry::new();
        registry
            .register(Arc::new(OrganizationIdQueryBuilder))
            .unwrap();
        registry.register(Arc::new(FailingBuilder)).unwrap();

        let context = QueryContext::new().with_organization("org1");
        let err = registry
            .build(StructuredQuery::match_all(), &context)
            .unwrap_err();

        assert_eq!(err.contributor, "failing");
        assert!(err.to_string().contains("field mapping missing"));
    }

    #[test]
    fn test_register_defaults() {
        let mut registry = QueryBuilderRegistry::new();
        registry.register_defaults().unwrap();
        assert_eq!(registry.names(), vec!["date_range"]);
        assert!(registry.register_defaults().is_err());
    }
}
