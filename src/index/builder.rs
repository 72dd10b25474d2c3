//! Background index builder
//!
//! One task walks the data root, builds a fresh [`Snapshot`], and publishes
//! it by swapping an atomic pointer. Readers load the pointer once per
//! request and keep using their copy even while a newer snapshot lands;
//! the old one is reclaimed when its last reader drops it.
//!
//! The walk runs once at startup and then on a fixed tick. A zero scan
//! frequency disables the builder entirely: the published snapshot stays
//! absent and discovery falls back to the filesystem. Symlinks are not
//! followed, so link cycles cannot trap the walk.

use crate::index::Snapshot;
use crate::stats::Stats;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use walkdir::WalkDir;

/// Holder of the currently published snapshot.
///
/// The builder stores with release ordering, handlers load with acquire;
/// no reader ever blocks another.
#[derive(Debug, Default)]
pub struct PathIndex {
    current: arc_swap::ArcSwapOption<Snapshot>,
}

impl PathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The published snapshot, if any walk has completed yet.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        self.current.store(Some(Arc::new(snapshot)));
    }
}

/// Walks the Whisper tree and publishes snapshots.
pub struct IndexBuilder {
    root: PathBuf,
    index: Arc<PathIndex>,
    stats: Arc<Stats>,
}

impl IndexBuilder {
    pub fn new(root: impl Into<PathBuf>, index: Arc<PathIndex>, stats: Arc<Stats>) -> Self {
        Self {
            root: root.into(),
            index,
            stats,
        }
    }

    /// Walk the tree once, build a snapshot, and publish it.
    ///
    /// Unreadable entries are logged and skipped; one bad directory must not
    /// block publication of the rest of the tree.
    pub fn rebuild(&self) {
        let scan_start = Instant::now();
        let mut paths = Vec::new();

        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::info!(error = %e, "error walking data root");
                    continue;
                }
            };

            let is_wsp = entry.file_name().to_string_lossy().ends_with(".wsp");
            if !entry.file_type().is_dir() && !is_wsp {
                continue;
            }

            let rel = match entry.path().strip_prefix(&self.root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            paths.push(format!("/{}", rel.to_string_lossy()));
        }

        let scan_elapsed = scan_start.elapsed();
        self.stats
            .file_scan_time_ns
            .add(scan_elapsed.as_nanos() as u64);

        let build_start = Instant::now();
        let snapshot = Snapshot::build(paths);
        let build_elapsed = build_start.elapsed();
        self.stats
            .index_build_time_ns
            .add(build_elapsed.as_nanos() as u64);
        self.stats.metrics_known.store(snapshot.known_metrics());

        tracing::debug!(
            files = snapshot.paths().len(),
            metrics_known = snapshot.known_metrics(),
            pruned_trigrams = snapshot.pruned_trigrams(),
            scan_runtime = ?scan_elapsed,
            index_runtime = ?build_elapsed,
            "file list updated"
        );

        self.index.publish(snapshot);
    }

    /// Run the builder: one forced build at startup, then one per tick.
    /// The exit signal is honored between ticks and between walks.
    pub fn spawn(
        self: Arc<Self>,
        scan_frequency: Duration,
        mut exit: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scan_frequency);
            // The first tick fires immediately: that is the startup build.
            loop {
                tokio::select! {
                    _ = exit.changed() => break,
                    _ = ticker.tick() => {}
                }

                let builder = Arc::clone(&self);
                let walk = tokio::task::spawn_blocking(move || builder.rebuild());
                if walk.await.is_err() {
                    tracing::error!("index rebuild task failed");
                }

                if *exit.borrow() {
                    break;
                }
            }
            tracing::debug!("index builder stopped");
        })
    }
}
