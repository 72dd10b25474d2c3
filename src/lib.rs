//! # Granary
//!
//! Read-only HTTP query server for a local tree of Whisper time-series
//! archives. Sits behind a graphite request router and answers three query
//! families: metric discovery (glob expansion and full listing), metadata
//! lookup (retention schema), and windowed point fetches merged with a hot
//! in-memory write buffer.
//!
//! ## Features
//!
//! - **Trigram index**: discovery runs against an immutable in-memory
//!   snapshot instead of walking directories
//! - **Lock-free reads**: the snapshot is swapped atomically by a background
//!   builder; request handlers never block each other
//! - **Hot-cache overlay**: fetches merge samples that have not reached
//!   disk yet
//! - **Interchangeable encodings**: JSON, protobuf (proto2 and proto3
//!   layouts), and pickle
//!
//! ## Modules
//!
//! - [`whisper`]: read-only Whisper file parser
//! - [`index`]: trigram snapshot + background builder
//! - [`glob`]: brace/wildcard expansion over the tree
//! - [`fetch`]: archive selection, disk reads, hot-cache overlay
//! - [`cache`]: hot write-buffer seam
//! - [`api`]: HTTP surface built with Axum
//! - [`stats`]: counter bank and latency buckets
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use granary::{api, AppState, IndexBuilder, MemoryCache, PathIndex, Stats};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stats = Arc::new(Stats::new(10, false));
//!     let index = Arc::new(PathIndex::new());
//!
//!     let (exit_tx, exit_rx) = tokio::sync::watch::channel(false);
//!     let builder = Arc::new(IndexBuilder::new(
//!         "/var/lib/graphite/whisper",
//!         Arc::clone(&index),
//!         Arc::clone(&stats),
//!     ));
//!     builder.spawn(Duration::from_secs(300), exit_rx);
//!
//!     let cache = Arc::new(MemoryCache::new());
//!     let state = Arc::new(AppState::new(
//!         "/var/lib/graphite/whisper",
//!         100,
//!         cache,
//!         index,
//!         stats,
//!     ));
//!     api::serve(state, "0.0.0.0:8080", Duration::from_secs(60)).await?;
//!
//!     let _ = exit_tx.send(true);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod glob;
pub mod index;
pub mod stats;
pub mod whisper;

// Re-export top-level types for convenience
pub use api::{ApiError, ApiResult, AppState};
pub use cache::{HotCache, HotSample, MemoryCache};
pub use config::{Config, ConfigError};
pub use fetch::{FetchError, Fetcher, PointVector};
pub use glob::{Expander, GlobMatch};
pub use index::{IndexBuilder, PathIndex, Snapshot};
pub use stats::{Counter, Stats};
pub use whisper::{Retention, TimeSeries, Whisper, WhisperError};
