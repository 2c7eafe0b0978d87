//! In-process search engine
//!
//! Implements [`SearchEngineClient`] over in-memory document maps. Used by
//! the CLI, in tests, and anywhere a cluster is not available. Alias changes
//! and alias reads share one lock, so a search either sees the index an alias
//! pointed at before a switch or the one it points at after, never a mix.

use crate::composer::{QueryParser, TermQueryParser};
use crate::index::client::{
    BulkCopyPage, BulkCopyRequest, DocumentTransform, EngineError, SearchEngineClient,
    SearchResults,
};
use crate::index::definition::IndexDefinition;
use crate::models::{Clause, RangeOp, StructuredQuery};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

struct PhysicalIndex {
    definition: IndexDefinition,
    documents: BTreeMap<String, Value>,
    /// Write sequence of the last change to each document
    written_at: HashMap<String, u64>,
    sequence: u64,
}

impl PhysicalIndex {
    fn new(definition: IndexDefinition) -> Self {
        Self {
            definition,
            documents: BTreeMap::new(),
            written_at: HashMap::new(),
            sequence: 0,
        }
    }

    fn upsert(&mut self, id: String, document: Value) {
        self.sequence += 1;
        self.written_at.insert(id.clone(), self.sequence);
        self.documents.insert(id, document);
    }

    fn changed_since(&self, id: &str, since: Option<u64>) -> bool {
        match since {
            Some(since) => self.written_at.get(id).is_some_and(|seq| *seq > since),
            None => true,
        }
    }
}

type SharedIndex = Arc<RwLock<PhysicalIndex>>;

/// In-memory implementation of the search engine client
#[derive(Default)]
pub struct InMemorySearchEngine {
    indexes: DashMap<String, SharedIndex>,
    aliases: RwLock<HashMap<String, String>>,
    parser: TermQueryParser,
}

impl InMemorySearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Definition a physical index was created with
    pub fn definition(&self, name: &str) -> Option<IndexDefinition> {
        self.indexes
            .get(name)
            .map(|entry| entry.value().read().definition.clone())
    }

    /// Snapshot of every alias and its target
    pub fn aliases(&self) -> HashMap<String, String> {
        self.aliases.read().clone()
    }

    /// Number of documents in an index or alias target
    pub fn document_count(&self, target: &str) -> usize {
        let physical = self.resolve(target);
        self.indexes
            .get(&physical)
            .map(|entry| entry.value().read().documents.len())
            .unwrap_or(0)
    }

    fn resolve(&self, target: &str) -> String {
        self.aliases
            .read()
            .get(target)
            .cloned()
            .unwrap_or_else(|| target.to_string())
    }

    fn physical(&self, name: &str) -> Result<SharedIndex, EngineError> {
        self.indexes
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::IndexNotFound(name.to_string()))
    }

    fn matches(&self, clause: &Clause, document: &Value) -> Result<bool, EngineError> {
        let matched = match clause {
            Clause::Term { field, value } => field_values(document, field)
                .into_iter()
                .any(|candidate| scalar(candidate).is_some_and(|text| text == value.as_str())),
            Clause::Match { text } => contains_text(document, &text.to_lowercase()),
            Clause::Phrase { field, text } => {
                let needle = text.to_lowercase();
                match field {
                    Some(field) => field_values(document, field)
                        .into_iter()
                        .any(|candidate| contains_text(candidate, &needle)),
                    None => contains_text(document, &needle),
                }
            }
            Clause::Range { field, op, value } => field_values(document, field)
                .into_iter()
                .filter_map(scalar)
                .any(|candidate| in_range(&candidate, *op, value)),
            Clause::QueryString { query } => match self
                .parser
                .parse(query)
                .map_err(|err| EngineError::InvalidQuery(err.to_string()))?
            {
                Some(parsed) => self.matches(&parsed, document)?,
                None => true,
            },
            Clause::Not { clause } => !self.matches(clause, document)?,
            Clause::Bool { must } => {
                for clause in must {
                    if !self.matches(clause, document)? {
                        return Ok(false);
                    }
                }
                true
            }
        };

        Ok(matched)
    }
}

#[async_trait]
impl SearchEngineClient for InMemorySearchEngine {
    async fn create_index(
        &self,
        name: &str,
        definition: &IndexDefinition,
    ) -> Result<(), EngineError> {
        match self.indexes.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(EngineError::IndexExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::new(RwLock::new(PhysicalIndex::new(
                    definition.clone(),
                ))));
                debug!(index = %name, "Created in-memory index");
                Ok(())
            }
        }
    }

    async fn index_exists(&self, name: &str) -> Result<bool, EngineError> {
        Ok(self.indexes.contains_key(name))
    }

    async fn list_indexes(&self, prefix: &str) -> Result<Vec<String>, EngineError> {
        let mut names: Vec<String> = self
            .indexes
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn delete_index(&self, name: &str) -> Result<(), EngineError> {
        let mut aliases = self.aliases.write();
        self.indexes
            .remove(name)
            .ok_or_else(|| EngineError::IndexNotFound(name.to_string()))?;
        aliases.retain(|_, target| target != name);
        Ok(())
    }

    async fn get_alias(&self, alias: &str) -> Result<Option<String>, EngineError> {
        Ok(self.aliases.read().get(alias).cloned())
    }

    async fn switch_alias(
        &self,
        alias: &str,
        from: Option<&str>,
        to: &str,
    ) -> Result<(), EngineError> {
        let mut aliases = self.aliases.write();

        if !self.indexes.contains_key(to) {
            return Err(EngineError::IndexNotFound(to.to_string()));
        }

        let current = aliases.get(alias).map(String::as_str);
        if current != from {
            return Err(EngineError::AliasMismatch {
                alias: alias.to_string(),
                expected: from.unwrap_or("<none>").to_string(),
                actual: current.unwrap_or("<none>").to_string(),
            });
        }

        aliases.insert(alias.to_string(), to.to_string());
        debug!(alias = %alias, from = ?from, to = %to, "Switched alias");
        Ok(())
    }

    async fn write_sequence(&self, index: &str) -> Result<u64, EngineError> {
        Ok(self.physical(index)?.read().sequence)
    }

    async fn bulk_copy(
        &self,
        source: &str,
        target: &str,
        request: &BulkCopyRequest,
        transform: &dyn DocumentTransform,
    ) -> Result<BulkCopyPage, EngineError> {
        let source_index = self.physical(source)?;
        let target_index = self.physical(target)?;
        let batch_size = request.batch_size.max(1);

        let mut batch: Vec<(String, Value)> = {
            let source = source_index.read();
            let lower = match &request.after {
                Some(cursor) => Bound::Excluded(cursor.as_str()),
                None => Bound::Unbounded,
            };
            source
                .documents
                .range::<str, _>((lower, Bound::Unbounded))
                .filter(|(id, _)| source.changed_since(id, request.changed_since))
                .take(batch_size + 1)
                .map(|(id, document)| (id.clone(), document.clone()))
                .collect()
        };

        let has_more = batch.len() > batch_size;
        batch.truncate(batch_size);
        let next_cursor = if has_more {
            batch.last().map(|(id, _)| id.clone())
        } else {
            None
        };

        let mut transformed = Vec::with_capacity(batch.len());
        for (id, document) in batch {
            let document = transform
                .transform(document)
                .map_err(|err| EngineError::Transform(format!("document '{}': {:#}", id, err)))?;
            transformed.push((id, document));
        }

        let copied = transformed.len() as u64;
        let mut target_index = target_index.write();
        for (id, document) in transformed {
            target_index.upsert(id, document);
        }

        Ok(BulkCopyPage {
            copied,
            next_cursor,
        })
    }

    async fn execute(
        &self,
        query: &StructuredQuery,
        target: &str,
    ) -> Result<SearchResults, EngineError> {
        // Hold the alias lock until the document lock is taken so an alias
        // switch cannot land between resolving and reading.
        let aliases = self.aliases.read();
        let physical = aliases
            .get(target)
            .cloned()
            .unwrap_or_else(|| target.to_string());
        let index = self.physical(&physical)?;
        let index = index.read();
        drop(aliases);

        let mut hits = Vec::new();
        for document in index.documents.values() {
            let mut matched = true;
            for clause in query.clauses() {
                if !self.matches(clause, document)? {
                    matched = false;
                    break;
                }
            }
            if matched {
                hits.push(document.clone());
            }
        }

        Ok(SearchResults {
            index: physical,
            total: hits.len() as u64,
            hits,
        })
    }

    async fn index_documents(
        &self,
        target: &str,
        documents: Vec<Value>,
    ) -> Result<u64, EngineError> {
        let physical = self.resolve(target);
        let index = self.physical(&physical)?;
        let mut index = index.write();

        let mut indexed = 0;
        for mut document in documents {
            let existing = document.get("id").and_then(scalar).map(Cow::into_owned);
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = Uuid::new_v4().to_string();
                    if let Value::Object(fields) = &mut document {
                        fields.insert("id".to_string(), Value::String(id.clone()));
                    }
                    id
                }
            };
            index.upsert(id, document);
            indexed += 1;
        }

        Ok(indexed)
    }
}

/// Values at a dotted field path, flattening arrays
fn field_values<'a>(document: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![document];
    for segment in path.split('.') {
        current = current
            .into_iter()
            .filter_map(|value| value.get(segment))
            .flat_map(|value| match value {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .collect();
    }
    current
}

fn scalar(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(text) => Some(Cow::Borrowed(text)),
        Value::Number(number) => Some(Cow::Owned(number.to_string())),
        Value::Bool(flag) => Some(Cow::Owned(flag.to_string())),
        _ => None,
    }
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(text) => text.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|item| contains_text(item, needle)),
        Value::Object(fields) => fields.values().any(|item| contains_text(item, needle)),
        _ => false,
    }
}

fn in_range(candidate: &str, op: RangeOp, bound: &str) -> bool {
    let ordering = match (candidate.parse::<f64>(), bound.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(candidate.cmp(bound)),
    };

    match (ordering, op) {
        (Some(Ordering::Greater), RangeOp::Gt | RangeOp::Gte) => true,
        (Some(Ordering::Equal), RangeOp::Gte | RangeOp::Lte) => true,
        (Some(Ordering::Less), RangeOp::Lt | RangeOp::Lte) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::client::IdentityTransform;
    use serde_json::json;

    async fn engine_with_docs() -> InMemorySearchEngine {
        let engine = InMemorySearchEngine::new();
        let definition = IndexDefinition::new("events", 1);
        engine.create_index("events-v1", &definition).await.unwrap();
        engine
            .switch_alias("events", None, "events-v1")
            .await
            .unwrap();
        engine
            .index_documents(
                "events",
                vec![
                    json!({"id": "1", "organization": "org1", "status": "fixed", "count": 5, "message": "Disk full on host"}),
                    json!({"id": "2", "organization": "org1", "status": "open", "count": 50, "tags": ["prod", "db"]}),
                    json!({"id": "3", "organization": "org2", "status": "fixed", "count": 7}),
                ],
            )
            .await
            .unwrap();
        engine
    }

    fn query(base: Option<Clause>) -> StructuredQuery {
        StructuredQuery::new(base)
    }

    #[tokio::test]
    async fn test_execute_through_alias() {
        let engine = engine_with_docs().await;

        let results = engine
            .execute(&query(Some(Clause::term("status", "fixed"))), "events")
            .await
            .unwrap();
        assert_eq!(results.index, "events-v1");
        assert_eq!(results.total, 2);
    }

    #[tokio::test]
    async fn test_clause_evaluation() {
        let engine = engine_with_docs().await;

        let cases = vec![
            (Clause::range("count", RangeOp::Gte, "7"), 2),
            (Clause::term("tags", "db"), 1),
            (Clause::Match { text: "disk".to_string() }, 1),
            (Clause::term("organization", "org1").negate(), 1),
            (
                Clause::QueryString {
                    query: "organization:org1 status:open".to_string(),
                },
                1,
            ),
        ];

        for (clause, expected) in cases {
            let results = engine
                .execute(&query(Some(clause.clone())), "events")
                .await
                .unwrap();
            assert_eq!(results.total, expected, "clause {:?}", clause);
        }
    }

    #[tokio::test]
    async fn test_switch_alias_checks_expected_source() {
        let engine = engine_with_docs().await;
        engine
            .create_index("events-v2", &IndexDefinition::new("events", 2))
            .await
            .unwrap();

        let err = engine
            .switch_alias("events", Some("events-v0"), "events-v2")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AliasMismatch { .. }));

        engine
            .switch_alias("events", Some("events-v1"), "events-v2")
            .await
            .unwrap();
        assert_eq!(
            engine.get_alias("events").await.unwrap().as_deref(),
            Some("events-v2")
        );
    }

    #[tokio::test]
    async fn test_bulk_copy_pages_with_cursor() {
        let engine = engine_with_docs().await;
        engine
            .create_index("events-v2", &IndexDefinition::new("events", 2))
            .await
            .unwrap();

        let request = BulkCopyRequest {
            after: None,
            batch_size: 2,
            changed_since: None,
        };
        let page = engine
            .bulk_copy("events-v1", "events-v2", &request, &IdentityTransform)
            .await
            .unwrap();
        assert_eq!(page.copied, 2);
        assert_eq!(page.next_cursor.as_deref(), Some("2"));

        let request = BulkCopyRequest {
            after: page.next_cursor,
            batch_size: 2,
            changed_since: None,
        };
        let page = engine
            .bulk_copy("events-v1", "events-v2", &request, &IdentityTransform)
            .await
            .unwrap();
        assert_eq!(page.copied, 1);
        assert_eq!(page.next_cursor, None);
        assert_eq!(engine.document_count("events-v2"), 3);
    }

    #[tokio::test]
    async fn test_bulk_copy_only_changed_documents() {
        let engine = engine_with_docs().await;
        engine
            .create_index("events-v2", &IndexDefinition::new("events", 2))
            .await
            .unwrap();
        let since = engine.write_sequence("events-v1").await.unwrap();
        assert_eq!(since, 3);

        engine
            .index_documents(
                "events",
                vec![
                    json!({"id": "0", "organization": "org3"}),
                    json!({"id": "2", "organization": "org1", "status": "fixed"}),
                ],
            )
            .await
            .unwrap();
        assert_eq!(engine.write_sequence("events-v1").await.unwrap(), 5);

        let request = BulkCopyRequest {
            after: None,
            batch_size: 10,
            changed_since: Some(since),
        };
        let page = engine
            .bulk_copy("events-v1", "events-v2", &request, &IdentityTransform)
            .await
            .unwrap();
        assert_eq!(page.copied, 2);
        assert_eq!(page.next_cursor, None);
        assert_eq!(engine.document_count("events-v2"), 2);
        // Copies count as writes on the target only
        assert_eq!(engine.write_sequence("events-v1").await.unwrap(), 5);
        assert_eq!(engine.write_sequence("events-v2").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_create_existing_index_fails() {
        let engine = engine_with_docs().await;
        let err = engine
            .create_index("events-v1", &IndexDefinition::new("events", 1))
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::IndexExists("events-v1".to_string()));
    }

    #[test]
    fn test_in_range_numeric_and_lexical() {
        assert!(in_range("10", RangeOp::Gt, "9"));
        assert!(!in_range("10", RangeOp::Lt, "9"));
        assert!(in_range("2024-02-01T00:00:00Z", RangeOp::Gte, "2024-01-01T00:00:00Z"));
    }
}
