use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope carried by a single search request.
///
/// Every identifier is optional: an empty or missing value means the query
/// is not restricted on that dimension. A context is built once per request
/// with the `with_*` constructors and read by every query builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContext {
    /// Organization the caller is authorized for
    #[serde(default)]
    organization_id: Option<String>,

    /// Project within the organization
    #[serde(default)]
    project_id: Option<String>,

    /// Stack (grouped event signature)
    #[serde(default)]
    stack_id: Option<String>,

    /// Precomputed boolean expression over security/system fields
    #[serde(default)]
    system_filter: Option<String>,

    /// Optional time window
    #[serde(default)]
    date_range: Option<DateRange>,
}

/// Time window applied to a date field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub field: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(
        field: impl Into<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            field: field.into(),
            start,
            end,
        }
    }

    /// A range with neither bound restricts nothing
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_stack(mut self, stack_id: impl Into<String>) -> Self {
        self.stack_id = Some(stack_id.into());
        self
    }

    pub fn with_system_filter(mut self, filter: impl Into<String>) -> Self {
        self.system_filter = Some(filter.into());
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn organization_id(&self) -> Option<&str> {
        non_empty(&self.organization_id)
    }

    pub fn project_id(&self) -> Option<&str> {
        non_empty(&self.project_id)
    }

    pub fn stack_id(&self) -> Option<&str> {
        non_empty(&self.stack_id)
    }

    pub fn system_filter(&self) -> Option<&str> {
        non_empty(&self.system_filter)
    }

    pub fn date_range(&self) -> Option<&DateRange> {
        self.date_range
            .as_ref()
            .filter(|range| !range.field.trim().is_empty() && !range.is_unbounded())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
