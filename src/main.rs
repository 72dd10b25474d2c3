//! Granary server binary
//!
//! Loads configuration, starts the index builder, and serves the query API.

use clap::Parser;
use granary::{api, AppState, Config, HotCache, IndexBuilder, MemoryCache, PathIndex, Stats};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "granary", about = "Read-only query server for Whisper archives")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    // Initialize logging; RUST_LOG wins over the config level.
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("granary={}", config.logging.level));
    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter));
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let data_root = config.store.data_root();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_root = %data_root.display(),
        max_globs = config.store.max_globs,
        scan_frequency_secs = config.store.scan_frequency_secs,
        "starting granary"
    );

    let stats = Arc::new(Stats::new(
        config.stats.buckets,
        config.stats.metrics_as_counters,
    ));
    let index = Arc::new(PathIndex::new());

    let (exit_tx, exit_rx) = tokio::sync::watch::channel(false);
    let scan_frequency = config.store.scan_frequency();
    let builder_handle = if scan_frequency.is_zero() {
        tracing::warn!("scan_frequency is zero, metric index disabled");
        None
    } else {
        let builder = Arc::new(IndexBuilder::new(
            &data_root,
            Arc::clone(&index),
            Arc::clone(&stats),
        ));
        Some(builder.spawn(scan_frequency, exit_rx))
    };

    let cache: Arc<dyn HotCache> = Arc::new(MemoryCache::new());
    let state = Arc::new(AppState::new(
        &data_root,
        config.store.max_globs,
        cache,
        index,
        stats,
    ));

    api::serve(state, &config.server.addr(), config.server.write_timeout()).await?;

    // Stop the builder between ticks; in-flight requests already finished.
    let _ = exit_tx.send(true);
    if let Some(handle) = builder_handle {
        let _ = handle.await;
    }

    tracing::info!("granary shutdown complete");
    Ok(())
}
