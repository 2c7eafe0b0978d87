use clap::{Parser, Subcommand};
use event_search::{
    config::{Config, ObservabilityConfig},
    index::InMemorySearchEngine,
    models::QueryContext,
    SearchConfiguration,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "event-search", version)]
#[command(about = "Index lifecycle and query composition for the event search layer", long_about = None)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing indexes and report outdated ones
    EnsureIndexes {
        /// Reindex outdated indexes (overrides elasticsearch.allow_migration)
        #[arg(long)]
        allow_migration: bool,
    },

    /// Compose a query and print the request body
    Compose {
        /// Index type, e.g. events or stacks
        #[arg(short, long)]
        index: String,

        #[arg(short, long, default_value = "")]
        query: String,

        #[arg(long)]
        organization: Option<String>,

        #[arg(long)]
        project: Option<String>,

        #[arg(long)]
        stack: Option<String>,

        /// Precomputed security filter expression
        #[arg(long)]
        system_filter: Option<String>,
    },
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("event_search={}", observability.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries command output
    if observability.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let loaded = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    init_tracing(&config.observability);
    tracing::info!("Starting event-search v{}", env!("CARGO_PKG_VERSION"));

    if config.observability.prometheus_enabled {
        if let Err(e) = event_search::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
        }
    }

    let endpoints = config.elasticsearch.endpoints()?;
    tracing::info!(endpoints = ?endpoints, "Using in-process search engine");

    let engine = Arc::new(InMemorySearchEngine::new());
    let search = SearchConfiguration::new(config.elasticsearch.clone(), engine)?;

    match cli.command {
        Commands::EnsureIndexes { allow_migration } => {
            let allow_migration = allow_migration || config.elasticsearch.allow_migration;
            let report = search.configure_indexes(allow_migration).await?;

            for pending in report.needs_attention() {
                tracing::warn!(index = %pending.name, outcome = ?pending.outcome, "⚠️  Index needs attention");
            }
            tracing::info!("✅ Indexes configured");
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Compose {
            index,
            query,
            organization,
            project,
            stack,
            system_filter,
        } => {
            search.configure_indexes(false).await?;

            let mut context = QueryContext::new();
            if let Some(organization) = organization {
                context = context.with_organization(organization);
            }
            if let Some(project) = project {
                context = context.with_project(project);
            }
            if let Some(stack) = stack {
                context = context.with_stack(stack);
            }
            if let Some(filter) = system_filter {
                context = context.with_system_filter(filter);
            }

            let targeted = search
                .composer()
                .compose_targeted(&index, &query, &context)
                .await?;

            let output = json!({
                "index": targeted.alias,
                "physical_index": targeted.physical_index,
                "body": targeted.query.to_search_body(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
