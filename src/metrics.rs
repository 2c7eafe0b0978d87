/// Prometheus metrics for query composition and index lifecycle.
///
/// Metrics are process-wide statics; [`init_metrics`] registers them with
/// [`PROMETHEUS_REGISTRY`] once at startup and [`gather_metrics`] renders the
/// text exposition format.
///
/// # Example
/// ```no_run
/// use event_search::metrics::QUERIES_COMPOSED_TOTAL;
///
/// QUERIES_COMPOSED_TOTAL.with_label_values(&["events"]).inc();
/// ```
use lazy_static::lazy_static;
use prometheus::{CounterVec, Opts, Registry};

const NAMESPACE: &str = "event_search";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Query Composition Metrics
    // ============================================================================

    /// Queries composed successfully
    ///
    /// Labels: index_type
    pub static ref QUERIES_COMPOSED_TOTAL: CounterVec = CounterVec::new(
        Opts::new("queries_composed_total", "Total number of composed queries")
            .namespace(NAMESPACE),
        &["index_type"]
    ).expect("Failed to create QUERIES_COMPOSED_TOTAL metric");

    /// Queries that failed to compose
    ///
    /// Labels: index_type, stage (macro_expansion, parse, build)
    pub static ref QUERY_COMPOSITION_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "query_composition_failures_total",
            "Total number of queries that failed to compose"
        )
        .namespace(NAMESPACE),
        &["index_type", "stage"]
    ).expect("Failed to create QUERY_COMPOSITION_FAILURES_TOTAL metric");

    // ============================================================================
    // Index Lifecycle Metrics
    // ============================================================================

    /// Physical indexes created
    ///
    /// Labels: index
    pub static ref INDEXES_CREATED_TOTAL: CounterVec = CounterVec::new(
        Opts::new("indexes_created_total", "Total number of physical indexes created")
            .namespace(NAMESPACE),
        &["index"]
    ).expect("Failed to create INDEXES_CREATED_TOTAL metric");

    /// Finished reindex tasks
    ///
    /// Labels: outcome (completed, failed, cancelled)
    pub static ref MIGRATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("migrations_total", "Total number of finished reindex tasks")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create MIGRATIONS_TOTAL metric");
}

/// Register all metrics with the global registry.
///
/// Fails with `AlreadyReg` when called twice in one process.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(QUERIES_COMPOSED_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(QUERY_COMPOSITION_FAILURES_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(INDEXES_CREATED_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(MIGRATIONS_TOTAL.clone()))?;

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
