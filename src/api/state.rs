//! Application state
//!
//! Shared by all request handlers. Everything here is either immutable or
//! internally synchronized, so handlers never coordinate with each other.

use crate::cache::HotCache;
use crate::fetch::Fetcher;
use crate::glob::Expander;
use crate::index::PathIndex;
use crate::stats::Stats;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared application state for all handlers.
pub struct AppState {
    /// Published snapshot holder; one acquire-load per request.
    pub index: Arc<PathIndex>,
    /// Glob expander rooted at the data directory.
    pub expander: Expander,
    /// Windowed point reader.
    pub fetcher: Arc<Fetcher>,
    /// Counter bank and latency buckets.
    pub stats: Arc<Stats>,
    /// Whisper tree root, trailing slash already stripped.
    pub data_root: PathBuf,
}

impl AppState {
    pub fn new(
        data_root: impl Into<PathBuf>,
        max_globs: usize,
        cache: Arc<dyn HotCache>,
        index: Arc<PathIndex>,
        stats: Arc<Stats>,
    ) -> Self {
        let data_root = data_root.into();
        let expander = Expander::new(&data_root, max_globs);
        let fetcher = Arc::new(Fetcher::new(&data_root, cache, Arc::clone(&stats)));
        Self {
            index,
            expander,
            fetcher,
            stats,
            data_root,
        }
    }
}
