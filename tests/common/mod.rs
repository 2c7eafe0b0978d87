//! Common test utilities
//!
//! [`RecordingEngine`] wraps the in-memory engine, records the calls the
//! coordinator makes, and can inject failures or hold copies open.

#![allow(dead_code)]

use async_trait::async_trait;
use event_search::index::{
    BulkCopyPage, BulkCopyRequest, DocumentTransform, EngineError, InMemorySearchEngine,
    IndexDefinition, SearchEngineClient, SearchResults,
};
use event_search::models::StructuredQuery;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Default)]
pub struct RecordingEngine {
    pub inner: InMemorySearchEngine,
    creates: Mutex<Vec<String>>,
    copies: Mutex<Vec<BulkCopyRequest>>,
    fail_creates: AtomicBool,
    /// Fail every copy call once this many have succeeded
    fail_copies_after: Mutex<Option<usize>>,
    successful_copies: AtomicUsize,
    /// Write a fresh document to the source after every copy
    write_during_copies: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl RecordingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create_calls(&self) -> Vec<String> {
        self.creates.lock().clone()
    }

    pub fn copy_requests(&self) -> Vec<BulkCopyRequest> {
        self.copies.lock().clone()
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_copies_after(&self, batches: Option<usize>) {
        *self.fail_copies_after.lock() = batches;
        self.successful_copies.store(0, Ordering::SeqCst);
    }

    pub fn write_during_copies(&self, enabled: bool) {
        self.write_during_copies.store(enabled, Ordering::SeqCst);
    }

    /// Make every copy wait for a permit from the returned semaphore
    pub fn hold_copies(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn release_copies(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.close();
        }
    }
}

#[async_trait]
impl SearchEngineClient for RecordingEngine {
    async fn create_index(
        &self,
        name: &str,
        definition: &IndexDefinition,
    ) -> Result<(), EngineError> {
        self.creates.lock().push(name.to_string());
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable("cluster is red".to_string()));
        }
        self.inner.create_index(name, definition).await
    }

    async fn index_exists(&self, name: &str) -> Result<bool, EngineError> {
        self.inner.index_exists(name).await
    }

    async fn list_indexes(&self, prefix: &str) -> Result<Vec<String>, EngineError> {
        self.inner.list_indexes(prefix).await
    }

    async fn delete_index(&self, name: &str) -> Result<(), EngineError> {
        self.inner.delete_index(name).await
    }

    async fn get_alias(&self, alias: &str) -> Result<Option<String>, EngineError> {
        self.inner.get_alias(alias).await
    }

    async fn switch_alias(
        &self,
        alias: &str,
        from: Option<&str>,
        to: &str,
    ) -> Result<(), EngineError> {
        self.inner.switch_alias(alias, from, to).await
    }

    async fn write_sequence(&self, index: &str) -> Result<u64, EngineError> {
        self.inner.write_sequence(index).await
    }

    async fn bulk_copy(
        &self,
        source: &str,
        target: &str,
        request: &BulkCopyRequest,
        transform: &dyn DocumentTransform,
    ) -> Result<BulkCopyPage, EngineError> {
        self.copies.lock().push(request.clone());

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            // A closed semaphore lets everything through
            let _ = gate.acquire().await;
        }

        let limit = *self.fail_copies_after.lock();
        if let Some(limit) = limit {
            if self.successful_copies.load(Ordering::SeqCst) >= limit {
                return Err(EngineError::Unavailable("bulk copy timed out".to_string()));
            }
        }

        let page = self.inner.bulk_copy(source, target, request, transform).await?;
        let copies = self.successful_copies.fetch_add(1, Ordering::SeqCst);
        if self.write_during_copies.load(Ordering::SeqCst) {
            self.inner
                .index_documents(source, vec![json!({ "id": format!("w{:03}", copies) })])
                .await?;
        }
        Ok(page)
    }

    async fn execute(
        &self,
        query: &StructuredQuery,
        target: &str,
    ) -> Result<SearchResults, EngineError> {
        self.inner.execute(query, target).await
    }

    async fn index_documents(
        &self,
        target: &str,
        documents: Vec<Value>,
    ) -> Result<u64, EngineError> {
        self.inner.index_documents(target, documents).await
    }
}

/// Create `{name}-v{version}` behind its alias and fill it with numbered
/// documents `d000`, `d001`, ...
pub async fn seed_index(
    engine: &InMemorySearchEngine,
    name: &str,
    version: u32,
    documents: usize,
) -> IndexDefinition {
    let definition = IndexDefinition::new(name, version);
    let physical = definition.physical_name();
    engine.create_index(&physical, &definition).await.unwrap();
    engine.switch_alias(name, None, &physical).await.unwrap();

    let documents: Vec<Value> = (0..documents)
        .map(|i| {
            json!({
                "id": format!("d{:03}", i),
                "organization": if i % 2 == 0 { "org1" } else { "org2" },
                "tags": "prod,db",
            })
        })
        .collect();
    engine.index_documents(name, documents).await.unwrap();
    definition
}

/// Helper function to parse Prometheus exposition format
/// Returns a map of metric lines for easy assertion
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines() {
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 {
                current_metric = parts[2].to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}
