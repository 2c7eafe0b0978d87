//! Scope and domain filter builders

use crate::builders::registry::QueryBuilder;
use crate::models::{Clause, QueryContext, RangeOp, StructuredQuery};
use chrono::SecondsFormat;

/// Field names used by the scope filters
pub mod fields {
    pub const ORGANIZATION: &str = "organization";
    pub const PROJECT: &str = "project";
    pub const STACK: &str = "stack";
}

/// Restricts results to the caller's organization
pub struct OrganizationIdQueryBuilder;

impl QueryBuilder for OrganizationIdQueryBuilder {
    fn name(&self) -> &str {
        "organization"
    }

    fn contribute(
        &self,
        _query: &StructuredQuery,
        context: &QueryContext,
    ) -> anyhow::Result<Option<Clause>> {
        Ok(context
            .organization_id()
            .map(|id| Clause::term(fields::ORGANIZATION, id)))
    }
}

/// Restricts results to one project
pub struct ProjectIdQueryBuilder;

impl QueryBuilder for ProjectIdQueryBuilder {
    fn name(&self) -> &str {
        "project"
    }

    fn contribute(
        &self,
        _query: &StructuredQuery,
        context: &QueryContext,
    ) -> anyhow::Result<Option<Clause>> {
        Ok(context
            .project_id()
            .map(|id| Clause::term(fields::PROJECT, id)))
    }
}

/// Restricts results to one stack
pub struct StackIdQueryBuilder;

impl QueryBuilder for StackIdQueryBuilder {
    fn name(&self) -> &str {
        "stack"
    }

    fn contribute(
        &self,
        _query: &StructuredQuery,
        context: &QueryContext,
    ) -> anyhow::Result<Option<Clause>> {
        Ok(context.stack_id().map(|id| Clause::term(fields::STACK, id)))
    }
}

/// Applies the precomputed system/security expression.
///
/// The expression is passed through untouched to the engine's query-string
/// parser.
pub struct SystemFilterQueryBuilder;

impl QueryBuilder for SystemFilterQueryBuilder {
    fn name(&self) -> &str {
        "system_filter"
    }

    fn contribute(
        &self,
        _query: &StructuredQuery,
        context: &QueryContext,
    ) -> anyhow::Result<Option<Clause>> {
        Ok(context.system_filter().map(|filter| Clause::QueryString {
            query: filter.to_string(),
        }))
    }
}

/// Limits a date field to the context's time window
pub struct DateRangeQueryBuilder;

impl QueryBuilder for DateRangeQueryBuilder {
    fn name(&self) -> &str {
        "date_range"
    }

    fn contribute(
        &self,
        _query: &StructuredQuery,
        context: &QueryContext,
    ) -> anyhow::Result<Option<Clause>> {
        let Some(range) = context.date_range() else {
            return Ok(None);
        };

        if let (Some(start), Some(end)) = (range.start, range.end) {
            anyhow::ensure!(
                start <= end,
                "date range on '{}' starts after it ends",
                range.field
            );
        }

        let mut bounds = Vec::with_capacity(2);
        if let Some(start) = range.start {
            bounds.push(Clause::range(
                &range.field,
                RangeOp::Gte,
                start.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if let Some(end) = range.end {
            bounds.push(Clause::range(
                &range.field,
                RangeOp::Lte,
                end.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }

        Ok(Clause::all(bounds))
    }
}
