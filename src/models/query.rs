//! Structured query representation

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{Display, EnumString};

/// Comparison used by a range clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
pub enum RangeOp {
    #[strum(serialize = "gt")]
    Gt,
    #[strum(serialize = "gte")]
    Gte,
    #[strum(serialize = "lt")]
    Lt,
    #[strum(serialize = "lte")]
    Lte,
}

/// A single query clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Clause {
    /// Exact value on a field
    Term { field: String, value: String },

    /// Free text across all fields
    Match { text: String },

    /// Quoted phrase, optionally scoped to a field
    Phrase { field: Option<String>, text: String },

    /// Bounded comparison on a field
    Range {
        field: String,
        op: RangeOp,
        value: String,
    },

    /// Unparsed expression handed to the engine's own query-string parser
    QueryString { query: String },

    Not { clause: Box<Clause> },

    /// Conjunction
    Bool { must: Vec<Clause> },
}

impl Clause {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Clause::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn range(field: impl Into<String>, op: RangeOp, value: impl Into<String>) -> Self {
        Clause::Range {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn negate(self) -> Self {
        Clause::Not {
            clause: Box::new(self),
        }
    }

    /// Combine clauses with AND, collapsing the trivial cases
    pub fn all(mut clauses: Vec<Clause>) -> Option<Self> {
        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(Clause::Bool { must: clauses }),
        }
    }

    /// Render as an Elasticsearch query DSL fragment
    pub fn to_dsl(&self) -> Value {
        match self {
            Clause::Term { field, value } => json!({ "term": { field: value } }),
            Clause::Match { text } => json!({ "simple_query_string": { "query": text } }),
            Clause::Phrase { field, text } => {
                let field = field.as_deref().unwrap_or("_all");
                json!({ "match_phrase": { field: text } })
            }
            Clause::Range { field, op, value } => {
                json!({ "range": { field: { op.to_string(): value } } })
            }
            Clause::QueryString { query } => json!({ "query_string": { "query": query } }),
            Clause::Not { clause } => json!({ "bool": { "must_not": [clause.to_dsl()] } }),
            Clause::Bool { must } => {
                let must: Vec<Value> = must.iter().map(Clause::to_dsl).collect();
                json!({ "bool": { "must": must } })
            }
        }
    }

    /// Collect every positive term clause, descending into conjunctions
    fn collect_terms<'a>(&'a self, out: &mut Vec<(&'a str, &'a str)>) {
        match self {
            Clause::Term { field, value } => out.push((field.as_str(), value.as_str())),
            Clause::Bool { must } => must.iter().for_each(|clause| clause.collect_terms(out)),
            _ => {}
        }
    }
}

/// A clause appended by a named query builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributedFilter {
    pub contributor: String,
    pub clause: Clause,
}

/// The final, engine-ready query.
///
/// The base clause comes from the parsed query text; filters are appended by
/// the query builder chain in registration order and can never be removed or
/// reordered once added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQuery {
    base: Option<Clause>,
    filters: Vec<ContributedFilter>,
}

impl StructuredQuery {
    pub fn new(base: Option<Clause>) -> Self {
        Self {
            base,
            filters: Vec::new(),
        }
    }

    /// A query that matches every document
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn base(&self) -> Option<&Clause> {
        self.base.as_ref()
    }

    pub fn filters(&self) -> &[ContributedFilter] {
        &self.filters
    }

    /// Filters appended by one contributor
    pub fn filters_from<'a>(&'a self, contributor: &'a str) -> impl Iterator<Item = &'a Clause> + 'a {
        self.filters
            .iter()
            .filter(move |filter| filter.contributor == contributor)
            .map(|filter| &filter.clause)
    }

    pub(crate) fn push_filter(&mut self, contributor: impl Into<String>, clause: Clause) {
        self.filters.push(ContributedFilter {
            contributor: contributor.into(),
            clause,
        });
    }

    /// Base clause followed by every filter clause
    pub fn clauses(&self) -> impl Iterator<Item = &Clause> {
        self.base
            .iter()
            .chain(self.filters.iter().map(|filter| &filter.clause))
    }

    /// All positive `(field, value)` term clauses in the query
    pub fn term_clauses(&self) -> Vec<(&str, &str)> {
        let mut terms = Vec::new();
        for clause in self.clauses() {
            clause.collect_terms(&mut terms);
        }
        terms
    }

    /// Render the request body sent to the search engine
    pub fn to_search_body(&self) -> Value {
        let must: Vec<Value> = self.base.iter().map(Clause::to_dsl).collect();
        let filter: Vec<Value> = self
            .filters
            .iter()
            .map(|filter| filter.clause.to_dsl())
            .collect();

        if must.is_empty() && filter.is_empty() {
            return json!({ "query": { "match_all": {} } });
        }

        json!({ "query": { "bool": { "must": must, "filter": filter } } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_collapses_trivial_cases() {
        assert_eq!(Clause::all(vec![]), None);
        assert_eq!(
            Clause::all(vec![Clause::term("status", "fixed")]),
            Some(Clause::term("status", "fixed"))
        );
        assert!(matches!(
            Clause::all(vec![Clause::term("a", "1"), Clause::term("b", "2")]),
            Some(Clause::Bool { .. })
        ));
    }

    #[test]
    fn test_search_body_separates_base_and_filters() {
        let mut query = StructuredQuery::new(Some(Clause::term("status", "fixed")));
        query.push_filter("organization", Clause::term("organization", "org1"));

        let body = query.to_search_body();
        assert_eq!(
            body["query"]["bool"]["must"][0]["term"]["status"],
            json!("fixed")
        );
        assert_eq!(
            body["query"]["bool"]["filter"][0]["term"]["organization"],
            json!("org1")
        );
    }

    #[test]
    fn test_match_all_body() {
        let body = StructuredQuery::match_all().to_search_body();
        assert_eq!(body, json!({ "query": { "match_all": {} } }));
    }

    #[test]
    fn test_range_dsl_uses_operator_name() {
        let clause = Clause::range("date", RangeOp::Gte, "2024-01-01T00:00:00Z");
        assert_eq!(
            clause.to_dsl(),
            json!({ "range": { "date": { "gte": "2024-01-01T00:00:00Z" } } })
        );
    }

    #[test]
    fn test_term_clauses_skip_negations() {
        let mut query = StructuredQuery::new(Clause::all(vec![
            Clause::term("status", "fixed"),
            Clause::term("is_hidden", "true").negate(),
        ]));
        query.push_filter("project", Clause::term("project", "p1"));

        assert_eq!(
            query.term_clauses(),
            vec![("status", "fixed"), ("project", "p1")]
        );
    }
}
