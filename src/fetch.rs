//! Fetch engine
//!
//! Resolves one dotted metric name to its Whisper file, picks the coarsest
//! archive that still covers the requested history, reads the disk window,
//! and overlays samples from the hot write buffer that have not reached disk
//! yet. Multi-metric fetches expand a glob target and absorb per-metric
//! failures so one bad file never empties the batch.

use crate::cache::{HotCache, HotSample};
use crate::glob::Expander;
use crate::index::Snapshot;
use crate::stats::Stats;
use crate::whisper::{Retention, Whisper, WhisperError};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors from a single-metric fetch
#[derive(Error, Debug)]
pub enum FetchError {
    /// Metric file missing or unreadable
    #[error("Can't open metric")]
    NotFound,

    /// Archive table of the file is unusable
    #[error("Corrupt metric file: {0}")]
    Corrupt(String),

    /// No archive reaches back far enough for the window
    #[error("Can't find proper archive for the request")]
    NoArchive,

    /// Reading points from an opened file failed
    #[error("Failed to fetch points")]
    ReadFailed,

    /// The file had nothing for the requested window
    #[error("Time range not found")]
    EmptyRange,
}

/// Uniform-step fetch result for one metric.
///
/// `stop_time == start_time + step_time * values.len()`; wherever
/// `is_absent[i]` is true, `values[i]` is 0.
#[derive(Debug, Clone, PartialEq)]
pub struct PointVector {
    pub name: String,
    pub start_time: i32,
    pub stop_time: i32,
    pub step_time: i32,
    pub values: Vec<f64>,
    pub is_absent: Vec<bool>,
}

/// Reads metric windows from the Whisper tree.
pub struct Fetcher {
    root: PathBuf,
    cache: Arc<dyn HotCache>,
    stats: Arc<Stats>,
}

impl Fetcher {
    pub fn new(root: impl Into<PathBuf>, cache: Arc<dyn HotCache>, stats: Arc<Stats>) -> Self {
        Self {
            root: root.into(),
            cache,
            stats,
        }
    }

    /// Fetch `[from, until]` for one dotted metric name.
    pub fn fetch(&self, metric: &str, from: i32, until: i32) -> Result<PointVector, FetchError> {
        self.fetch_at(metric, from, until, chrono::Utc::now().timestamp())
    }

    fn fetch_at(
        &self,
        metric: &str,
        from: i32,
        until: i32,
        now: i64,
    ) -> Result<PointVector, FetchError> {
        let path = self
            .root
            .join(format!("{}.wsp", metric.replace('.', "/")));

        let mut whisper = match Whisper::open(&path) {
            Ok(w) => w,
            Err(WhisperError::Corrupt(msg)) => {
                self.stats.render_errors.inc();
                tracing::info!(path = %path.display(), error = %msg, "corrupt metric file");
                return Err(FetchError::Corrupt(msg));
            }
            Err(e) => {
                // The frontend routinely asks for metrics that are not here.
                self.stats.notfound.inc();
                tracing::info!(path = %path.display(), error = %e, "open error");
                return Err(FetchError::NotFound);
            }
        };

        let retentions = whisper.retentions();
        let best_step = retentions[0].seconds_per_point;
        let step = match select_step(&retentions, now, from, until) {
            Ok(step) => step,
            Err(e) => {
                self.stats.render_errors.inc();
                tracing::info!(metric = %metric, from, until, "can't find proper archive");
                return Err(e);
            }
        };

        // The hot buffer holds best-step samples; a coarser read cannot
        // align them.
        let cache_data = if step == best_step {
            let start = Instant::now();
            let samples = self.cache.samples_for(metric);
            self.stats
                .cache_wait_time_fetch_ns
                .add(start.elapsed().as_nanos() as u64);
            Some(samples)
        } else {
            tracing::debug!(
                metric = %metric,
                step,
                best_step,
                "hot cache skipped (required step != best step)"
            );
            None
        };

        self.stats.disk_requests.inc();
        let disk_start = Instant::now();
        let series = whisper.fetch_at(from as i64, until as i64, now);
        self.stats
            .disk_wait_time_ns
            .add(disk_start.elapsed().as_nanos() as u64);

        let series = match series {
            Ok(Some(series)) => series,
            Ok(None) => {
                self.stats.render_errors.inc();
                tracing::info!(metric = %metric, from, until, "metric time range not found");
                return Err(FetchError::EmptyRange);
            }
            Err(e) => {
                self.stats.render_errors.inc();
                tracing::info!(metric = %metric, error = %e, "failed to fetch points");
                return Err(FetchError::ReadFailed);
            }
        };

        self.stats.metrics_returned.inc();
        self.stats.points_returned.add(series.values.len() as u64);

        let mut response = PointVector {
            name: metric.to_string(),
            start_time: series.from_time as i32,
            stop_time: series.until_time as i32,
            step_time: series.step as i32,
            values: Vec::with_capacity(series.values.len()),
            is_absent: Vec::with_capacity(series.values.len()),
        };
        for v in &series.values {
            if v.is_nan() {
                response.values.push(0.0);
                response.is_absent.push(true);
            } else {
                response.values.push(*v);
                response.is_absent.push(false);
            }
        }

        if let Some(samples) = cache_data {
            if !samples.is_empty() {
                self.stats.cache_requests.inc();
                let start = Instant::now();
                overlay_hot_samples(&mut response, &samples);
                self.stats
                    .cache_work_time_ns
                    .add(start.elapsed().as_nanos() as u64);
            }
        }

        Ok(response)
    }

    /// Expand a glob target and fetch every matched leaf. Per-metric
    /// failures (including panics out of a corrupt file) are logged and
    /// dropped; the rest of the batch survives.
    pub fn fetch_multi(
        &self,
        expander: &Expander,
        snapshot: Option<&Snapshot>,
        target: &str,
        from: i32,
        until: i32,
    ) -> Vec<PointVector> {
        let matches = expander.expand(snapshot, target);
        tracing::debug!(
            target = %target,
            matches = matches.len(),
            from,
            until,
            "expandGlobs result"
        );

        let mut results = Vec::new();
        for m in matches {
            if !m.is_leaf {
                tracing::debug!(metric = %m.path, "skipping directory");
                continue;
            }
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| self.fetch(&m.path, from, until)));
            match outcome {
                Ok(Ok(response)) => results.push(response),
                Ok(Err(e)) => {
                    tracing::debug!(metric = %m.path, error = %e, "fetch failed");
                }
                Err(_) => {
                    self.stats.render_errors.inc();
                    tracing::error!(metric = %m.path, "panic recovered during fetch");
                }
            }
        }
        results
    }
}

/// Pick the read step for a window: the first (coarsest-needed) retention
/// whose coverage reaches back to `from`.
///
/// When even the coarsest archive starts after `until`, there is nothing to
/// read. When it covers part of the window, degrade to it.
fn select_step(retentions: &[Retention], now: i64, from: i32, until: i32) -> Result<u32, FetchError> {
    let diff = now - from as i64;
    for retention in retentions {
        if retention.max_retention() as i64 >= diff {
            return Ok(retention.seconds_per_point);
        }
    }

    let coarsest = retentions.last().expect("validated non-empty");
    if now - coarsest.max_retention() as i64 > until as i64 {
        return Err(FetchError::NoArchive);
    }
    tracing::debug!("no archive contains the full window, using the least precise one");
    Ok(coarsest.max_retention())
}

/// Overlay buffered samples onto a disk result. Timestamps are floored to
/// the step; samples landing outside `[start_time, stop_time)` are dropped.
/// Applying the same samples twice is idempotent.
pub fn overlay_hot_samples(response: &mut PointVector, samples: &[HotSample]) {
    let step = response.step_time as i64;
    if step <= 0 {
        return;
    }
    let start = response.start_time as i64;
    let stop = response.stop_time as i64;

    for sample in samples {
        let ts = sample.timestamp - sample.timestamp.rem_euclid(step);
        if ts < start || ts >= stop {
            continue;
        }
        let index = ((ts - start) / step) as usize;
        response.values[index] = sample.value;
        response.is_absent[index] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::whisper::fixture;
    use tempfile::tempdir;

    fn retention(seconds_per_point: u32, points: u32) -> Retention {
        Retention {
            seconds_per_point,
            points,
        }
    }

    fn fetcher(root: &std::path::Path) -> (Fetcher, Arc<MemoryCache>, Arc<Stats>) {
        let cache = Arc::new(MemoryCache::new());
        let stats = Arc::new(Stats::new(3, true));
        let f = Fetcher::new(root, Arc::clone(&cache) as Arc<dyn HotCache>, Arc::clone(&stats));
        (f, cache, stats)
    }

    fn vector(start: i32, step: i32, values: Vec<f64>, is_absent: Vec<bool>) -> PointVector {
        let stop = start + step * values.len() as i32;
        PointVector {
            name: "test.metric".to_string(),
            start_time: start,
            stop_time: stop,
            step_time: step,
            values,
            is_absent,
        }
    }

    #[test]
    fn test_select_step_first_covering_archive() {
        // 10s/1h, 60s/1d, 600s/30d.
        let retentions = [retention(10, 360), retention(60, 1440), retention(600, 4320)];

        // diff = 1000s, within the first hour: finest step wins.
        assert_eq!(
            select_step(&retentions, 1_000_000, 999_000, 999_900).unwrap(),
            10
        );

        // diff = 2 days: the 60s archive is too short, 600s covers it.
        assert_eq!(
            select_step(&retentions, 1_000_000, 1_000_000 - 2 * 86_400, 999_900).unwrap(),
            600
        );
    }

    #[test]
    fn test_select_step_degenerate_window() {
        let retentions = [retention(10, 6)]; // covers one minute

        // Window entirely before what the archive holds.
        let err = select_step(&retentions, 1_000_000, 900_000, 900_100).unwrap_err();
        assert!(matches!(err, FetchError::NoArchive));

        // Window starts too early but still overlaps: degrade to the
        // coarsest coverage as the step.
        assert_eq!(
            select_step(&retentions, 1_000_000, 900_000, 999_999).unwrap(),
            60
        );
    }

    #[test]
    fn test_overlay_replaces_in_window_slots() {
        let mut pv = vector(960, 60, vec![1.0, 2.0, 3.0], vec![false, false, true]);

        overlay_hot_samples(
            &mut pv,
            &[
                HotSample::new(1021, 9.0),  // floors to 1020 → index 1
                HotSample::new(1080, 8.0),  // exact slot → index 2, clears absent
                HotSample::new(2000, 7.0),  // floors to 1980, past stop → dropped
            ],
        );

        assert_eq!(pv.values, vec![1.0, 9.0, 8.0]);
        assert_eq!(pv.is_absent, vec![false, false, false]);
    }

    #[test]
    fn test_overlay_is_idempotent() {
        let samples = [HotSample::new(1021, 9.0), HotSample::new(1080, 8.0)];

        let mut once = vector(960, 60, vec![1.0, 2.0, 3.0], vec![false, false, true]);
        overlay_hot_samples(&mut once, &samples);

        let mut twice = once.clone();
        overlay_hot_samples(&mut twice, &samples);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_overlay_drops_sample_before_window() {
        let mut pv = vector(960, 60, vec![1.0], vec![false]);
        overlay_hot_samples(&mut pv, &[HotSample::new(900, 9.0)]);
        assert_eq!(pv.values, vec![1.0]);
    }

    #[test]
    fn test_fetch_converts_nan_to_absent() {
        let dir = tempdir().unwrap();
        fixture::create(&dir.path().join("a/b.wsp"), &[(10, 360)], 1, 0.5).unwrap();

        let now = 1_000_000;
        // One real point surrounded by unwritten slots.
        fixture::write_points(&dir.path().join("a/b.wsp"), &[(999_920, 2.0)]).unwrap();

        let (fetcher, _cache, _stats) = fetcher(dir.path());
        let pv = fetcher.fetch_at("a.b", 999_900, 999_930, now).unwrap();

        assert_eq!(pv.name, "a.b");
        assert_eq!(pv.step_time, 10);
        assert_eq!(pv.values, vec![0.0, 2.0, 0.0]);
        assert_eq!(pv.is_absent, vec![true, false, true]);
        assert_eq!(
            pv.stop_time,
            pv.start_time + pv.step_time * pv.values.len() as i32
        );
    }

    #[test]
    fn test_fetch_overlays_hot_cache_at_best_step() {
        let dir = tempdir().unwrap();
        fixture::create(&dir.path().join("a/b.wsp"), &[(10, 360)], 1, 0.5).unwrap();
        fixture::write_points(&dir.path().join("a/b.wsp"), &[(999_920, 2.0)]).unwrap();

        let now = 1_000_000;
        let (fetcher, cache, stats) = fetcher(dir.path());
        // 999_933 floors to the slot after the disk point.
        cache.set("a.b", vec![HotSample::new(999_933, 9.0)]);

        let pv = fetcher.fetch_at("a.b", 999_900, 999_930, now).unwrap();

        let idx = ((999_930 - pv.start_time as i64) / 10) as usize;
        assert_eq!(pv.values[idx], 9.0);
        assert!(!pv.is_absent[idx]);
        assert_eq!(stats.cache_requests.load(), 1);
    }

    #[test]
    fn test_fetch_skips_cache_on_coarse_step() {
        let dir = tempdir().unwrap();
        // 60s of fine data, a day of coarse data.
        fixture::create(&dir.path().join("a/b.wsp"), &[(10, 6), (60, 1440)], 1, 0.5).unwrap();

        let now = 1_000_000;
        let (fetcher, cache, stats) = fetcher(dir.path());
        cache.set("a.b", vec![HotSample::new(999_000, 9.0)]);

        // Window older than the fine archive: coarse step, no overlay.
        let pv = fetcher.fetch_at("a.b", 998_000, 999_000, now).unwrap();
        assert_eq!(pv.step_time, 60);
        assert_eq!(stats.cache_requests.load(), 0);
        assert!(pv.values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_fetch_missing_metric() {
        let dir = tempdir().unwrap();
        let (fetcher, _cache, stats) = fetcher(dir.path());

        let err = fetcher.fetch_at("no.such", 0, 100, 1_000_000).unwrap_err();
        assert!(matches!(err, FetchError::NotFound));
        assert_eq!(stats.notfound.load(), 1);
    }

    #[test]
    fn test_fetch_corrupt_metric() {
        let dir = tempdir().unwrap();
        // Coarser archive covering less history than the finer one.
        fixture::create(&dir.path().join("bad.wsp"), &[(10, 360), (60, 10)], 1, 0.5).unwrap();

        let (fetcher, _cache, stats) = fetcher(dir.path());
        let err = fetcher.fetch_at("bad", 999_000, 999_900, 1_000_000).unwrap_err();
        assert!(matches!(err, FetchError::Corrupt(_)));
        assert_eq!(stats.render_errors.load(), 1);
        assert_eq!(stats.notfound.load(), 0);
    }

    #[test]
    fn test_fetch_multi_absorbs_per_metric_errors() {
        let dir = tempdir().unwrap();
        let now = chrono::Utc::now().timestamp();

        fixture::create(&dir.path().join("m/good.wsp"), &[(10, 360)], 1, 0.5).unwrap();
        fixture::write_points(
            &dir.path().join("m/good.wsp"),
            &[(now as u32 - 100, 4.0)],
        )
        .unwrap();
        // Truncated header: opens fail, the batch must survive.
        std::fs::write(dir.path().join("m/broken.wsp"), b"\x00\x00").unwrap();

        let (fetcher, _cache, _stats) = fetcher(dir.path());
        let expander = Expander::new(dir.path(), 10);

        let results = fetcher.fetch_multi(
            &expander,
            None,
            "m.*",
            (now - 300) as i32,
            now as i32,
        );

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "m.good");
    }

    #[test]
    fn test_fetch_multi_skips_directories() {
        let dir = tempdir().unwrap();
        let now = chrono::Utc::now().timestamp();
        std::fs::create_dir_all(dir.path().join("m/subdir")).unwrap();
        fixture::create(&dir.path().join("m/leaf.wsp"), &[(10, 360)], 1, 0.5).unwrap();
        fixture::write_points(&dir.path().join("m/leaf.wsp"), &[(now as u32 - 50, 1.0)])
            .unwrap();

        let (fetcher, _cache, _stats) = fetcher(dir.path());
        let expander = Expander::new(dir.path(), 10);

        let results =
            fetcher.fetch_multi(&expander, None, "m.*", (now - 300) as i32, now as i32);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "m.leaf");
    }
}
