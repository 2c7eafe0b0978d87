/// Query builder chain
///
/// This module provides the ordered, append-only chain that turns a parsed
/// query into the final request:
/// - Scope filters (organization, project, stack)
/// - The system/security filter
/// - Default domain filters (date range)

pub mod contributors;
pub mod registry;

pub use contributors::{
    DateRangeQueryBuilder, OrganizationIdQueryBuilder, ProjectIdQueryBuilder,
    StackIdQueryBuilder, SystemFilterQueryBuilder,
};
pub use registry::{BuilderError, QueryBuilder, QueryBuilderRegistry};
