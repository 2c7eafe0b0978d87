//! Metrics emitted by composition and index lifecycle

mod common;

use common::{parse_prometheus_output, RecordingEngine};
use event_search::config::ElasticsearchSettings;
use event_search::metrics::{gather_metrics, init_metrics, QUERY_COMPOSITION_FAILURES_TOTAL};
use event_search::models::QueryContext;
use event_search::SearchConfiguration;

#[tokio::test]
async fn test_composition_and_creation_are_counted() {
    let _ = init_metrics();

    let engine = RecordingEngine::new();
    let configuration =
        SearchConfiguration::new(ElasticsearchSettings::default(), engine.clone()).unwrap();
    configuration.configure_indexes(false).await.unwrap();

    let composer = configuration.composer();
    composer
        .compose("stacks", "is:fixed", &QueryContext::new())
        .unwrap();
    assert!(composer
        .compose("stacks", "status:", &QueryContext::new())
        .is_err());

    let failures = QUERY_COMPOSITION_FAILURES_TOTAL
        .with_label_values(&["stacks", "parse"])
        .get();
    assert!(failures >= 1.0);

    let metrics = parse_prometheus_output(&gather_metrics());
    assert!(metrics.contains_key("event_search_queries_composed_total"));
    assert!(metrics.contains_key("event_search_query_composition_failures_total"));

    let created = &metrics["event_search_indexes_created_total"];
    assert!(created.iter().any(|line| line.contains("index=\"organizations\"")));
}
