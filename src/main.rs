//! claimwatch — Binary Entrypoint
//! Boots the Axum HTTP server, wiring routes, shared state, and the
//! background ingest scheduler.
//!
//! See `README.md` for quickstart and `DESIGN.md` for architecture notes.

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use claimwatch::api::{self, AppState};
use claimwatch::claims::ClaimIngestor;
use claimwatch::classify::build_classifier;
use claimwatch::collect::SourceAdapter;
use claimwatch::config::AppConfig;
use claimwatch::extract::tags::ToolVocabulary;
use claimwatch::lock::LockManager;
use claimwatch::metrics::Metrics;
use claimwatch::pipeline::{spawn_scheduler, Pipeline};
use claimwatch::sources::{ChangelogFeedAdapter, MakerFeedAdapter};
use claimwatch::store::SqliteStore;
use claimwatch::upsert::RecordEngine;

/// Compact tracing logs, filterable via `RUST_LOG`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("claimwatch=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env();
    let metrics = Metrics::init(config.lock_ttl.as_secs());

    let store = Arc::new(SqliteStore::connect(&config.database_path).await?);

    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for feed in &config.changelog_feeds {
        adapters.push(Arc::new(ChangelogFeedAdapter::from_url(&feed.id, &feed.url)));
    }
    for feed in &config.maker_feeds {
        adapters.push(Arc::new(MakerFeedAdapter::from_url(&feed.id, &feed.url)));
    }
    tracing::info!(target: "ingest", adapters = adapters.len(), "source adapters configured");

    let engine = RecordEngine::new(
        store.clone(),
        build_classifier(),
        ToolVocabulary::load_default(),
    );
    let claims = Arc::new(ClaimIngestor::new(
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    let pipeline = Arc::new(Pipeline::new(
        LockManager::new(store.clone()),
        adapters,
        engine,
        claims.clone(),
        config.lock_ttl,
    ));

    if let Some(every) = config.ingest_interval {
        tracing::info!(target: "ingest", every_secs = every.as_secs(), "background scheduler enabled");
        spawn_scheduler(pipeline.clone(), every);
    }

    let state = AppState {
        pipeline,
        claims,
        records: store.clone(),
        claim_store: store,
        cron_secret: config.cron_secret.clone(),
    };
    let app = api::router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(target: "api", addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
