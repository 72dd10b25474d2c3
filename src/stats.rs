//! Request counters and latency buckets
//!
//! A flat bank of atomic counters mutated on the hot path with relaxed
//! fetch-adds, plus a log10-bucketed request latency histogram. Emission
//! supports two modes: cumulative (send the running value) and delta
//! (send the difference since the last emit, then subtract it).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Monotonically increasing 64-bit counter.
#[derive(Debug, Default)]
pub struct Counter {
    v: AtomicU64,
}

impl Counter {
    pub const fn new() -> Self {
        Self {
            v: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc(&self) {
        self.v.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, delta: u64) {
        self.v.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> u64 {
        self.v.load(Ordering::Relaxed)
    }

    /// Overwrite the value. Used for gauges (`metrics_known`).
    #[inline]
    pub fn store(&self, value: u64) {
        self.v.store(value, Ordering::Relaxed);
    }

    /// Read the current value and subtract it, returning what was read.
    /// Increments that land between the read and the subtract survive
    /// for the next flush.
    #[inline]
    fn flush(&self) -> u64 {
        let v = self.v.load(Ordering::Relaxed);
        self.v.fetch_sub(v, Ordering::Relaxed);
        v
    }
}

/// The counter bank shared by every request handler and the index builder.
#[derive(Debug)]
pub struct Stats {
    pub render_requests: Counter,
    pub render_errors: Counter,
    pub notfound: Counter,
    pub find_requests: Counter,
    pub find_errors: Counter,
    pub find_zero: Counter,
    pub info_requests: Counter,
    pub info_errors: Counter,
    pub list_requests: Counter,
    pub list_errors: Counter,
    pub cache_hit: Counter,
    pub cache_miss: Counter,
    pub cache_requests: Counter,
    pub cache_work_time_ns: Counter,
    pub cache_wait_time_fetch_ns: Counter,
    pub disk_wait_time_ns: Counter,
    pub disk_requests: Counter,
    pub points_returned: Counter,
    pub metrics_returned: Counter,
    pub metrics_found: Counter,
    pub fetch_size_bytes: Counter,
    pub metrics_known: Counter,
    pub index_build_time_ns: Counter,
    pub file_scan_time_ns: Counter,

    /// `buckets + 1` slots; the last one is the overflow bucket.
    time_buckets: Vec<AtomicU64>,
    as_counters: bool,
}

impl Stats {
    pub fn new(buckets: usize, metrics_as_counters: bool) -> Self {
        let mut time_buckets = Vec::with_capacity(buckets + 1);
        time_buckets.resize_with(buckets + 1, AtomicU64::default);

        Self {
            render_requests: Counter::new(),
            render_errors: Counter::new(),
            notfound: Counter::new(),
            find_requests: Counter::new(),
            find_errors: Counter::new(),
            find_zero: Counter::new(),
            info_requests: Counter::new(),
            info_errors: Counter::new(),
            list_requests: Counter::new(),
            list_errors: Counter::new(),
            cache_hit: Counter::new(),
            cache_miss: Counter::new(),
            cache_requests: Counter::new(),
            cache_work_time_ns: Counter::new(),
            cache_wait_time_fetch_ns: Counter::new(),
            disk_wait_time_ns: Counter::new(),
            disk_requests: Counter::new(),
            points_returned: Counter::new(),
            metrics_returned: Counter::new(),
            metrics_found: Counter::new(),
            fetch_size_bytes: Counter::new(),
            metrics_known: Counter::new(),
            index_build_time_ns: Counter::new(),
            file_scan_time_ns: Counter::new(),
            time_buckets,
            as_counters: metrics_as_counters,
        }
    }

    /// Number of configured buckets, excluding the overflow slot.
    pub fn buckets(&self) -> usize {
        self.time_buckets.len() - 1
    }

    /// Record a served request into the latency histogram.
    ///
    /// Bucket index is `floor(log10(ms))` clamped into `[0, buckets]`.
    /// Requests landing in the overflow slot are logged.
    pub fn bucket_request_time(&self, uri: &str, elapsed: Duration) {
        let buckets = self.buckets();
        let ms = elapsed.as_millis() as f64;

        // log10(0) is -inf; the saturating cast plus max() pins it to slot 0.
        let bucket = (ms.log10() as isize).max(0) as usize;

        if bucket < buckets {
            self.time_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        } else {
            self.time_buckets[buckets].fetch_add(1, Ordering::Relaxed);
            tracing::info!(uri = %uri, elapsed_ms = ms, "slow request");
        }
    }

    /// Emit every counter through `send`.
    ///
    /// In cumulative mode (`metrics_as_counters = true`) the running values
    /// are sent as-is; in delta mode each counter is sent and then reset by
    /// the amount sent.
    pub fn emit(&self, send: &mut dyn FnMut(&str, u64)) {
        let mut out = |name: &str, c: &Counter| {
            if self.as_counters {
                send(name, c.load());
            } else {
                send(name, c.flush());
            }
        };

        out("render_requests", &self.render_requests);
        out("render_errors", &self.render_errors);
        out("notfound", &self.notfound);
        out("find_requests", &self.find_requests);
        out("find_errors", &self.find_errors);
        out("find_zero", &self.find_zero);
        out("list_requests", &self.list_requests);
        out("list_errors", &self.list_errors);
        out("cache_hit", &self.cache_hit);
        out("cache_miss", &self.cache_miss);
        out("cache_work_time_ns", &self.cache_work_time_ns);
        out("cache_wait_time_fetch_ns", &self.cache_wait_time_fetch_ns);
        out("cache_requests", &self.cache_requests);
        out("disk_wait_time_ns", &self.disk_wait_time_ns);
        out("disk_requests", &self.disk_requests);
        out("points_returned", &self.points_returned);
        out("metrics_returned", &self.metrics_returned);
        out("metrics_found", &self.metrics_found);
        out("fetch_size_bytes", &self.fetch_size_bytes);
        out("metrics_known", &self.metrics_known);
        out("index_build_time_ns", &self.index_build_time_ns);
        out("file_scan_time_ns", &self.file_scan_time_ns);

        for (i, bucket) in self.time_buckets.iter().enumerate() {
            let name = format!("requests_in_{}ms_to_{}ms", i * 100, (i + 1) * 100);
            let v = if self.as_counters {
                bucket.load(Ordering::Relaxed)
            } else {
                let v = bucket.load(Ordering::Relaxed);
                bucket.fetch_sub(v, Ordering::Relaxed);
                v
            };
            send(&name, v);
        }
    }
}
