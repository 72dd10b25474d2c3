//! Read-only Whisper archive parser
//!
//! Whisper files store one metric as a fixed set of archives ("retentions"),
//! finest resolution first, each a circular buffer of `(interval, value)`
//! points anchored at the archive's base point.
//!
//! Layout (all integers big-endian):
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ METADATA (16 bytes)                     │
//! │   aggregation_type: u32                 │
//! │   max_retention: u32                    │
//! │   x_files_factor: f32                   │
//! │   archive_count: u32                    │
//! ├─────────────────────────────────────────┤
//! │ ARCHIVE INFO (12 bytes each)            │
//! │   offset: u32                           │
//! │   seconds_per_point: u32                │
//! │   points: u32                           │
//! ├─────────────────────────────────────────┤
//! │ DATA (12 bytes per point, per archive)  │
//! │   interval: u32                         │
//! │   value: f64                            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! This module never writes: the serving path treats the tree as read-only.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

/// Metadata header size in bytes
const METADATA_SIZE: usize = 16;

/// Per-archive info record size in bytes
const ARCHIVE_INFO_SIZE: usize = 12;

/// On-disk point size in bytes
const POINT_SIZE: usize = 12;

/// Upper bound on the archive count; anything larger is a corrupt header.
const MAX_ARCHIVES: u32 = 1024;

/// Errors reading a Whisper file
#[derive(Error, Debug)]
pub enum WhisperError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Header or archive table fails validation
    #[error("Corrupt whisper file: {0}")]
    Corrupt(String),

    /// Requested window has `from` after `until`
    #[error("Invalid time interval: from {from} is after until {until}")]
    InvalidInterval { from: i64, until: i64 },
}

/// One resolution tier of a Whisper file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub seconds_per_point: u32,
    pub points: u32,
}

impl Retention {
    /// Seconds of history this archive covers.
    pub fn max_retention(&self) -> u32 {
        self.seconds_per_point * self.points
    }
}

/// Uniform-step series read from one archive.
///
/// `until_time == from_time + step * values.len()`; absent slots are NaN.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    pub from_time: u32,
    pub until_time: u32,
    pub step: u32,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct ArchiveInfo {
    offset: u32,
    retention: Retention,
}

/// An open Whisper file handle.
#[derive(Debug)]
pub struct Whisper {
    file: File,
    aggregation_type: u32,
    max_retention: u32,
    x_files_factor: f32,
    archives: Vec<ArchiveInfo>,
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

impl Whisper {
    /// Open a Whisper file and validate its archive table.
    pub fn open(path: &Path) -> Result<Self, WhisperError> {
        let mut file = File::open(path)?;

        let mut header = [0u8; METADATA_SIZE];
        file.read_exact(&mut header)?;

        let aggregation_type = read_u32(&header, 0);
        let max_retention = read_u32(&header, 4);
        let x_files_factor = f32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        let archive_count = read_u32(&header, 12);

        if archive_count == 0 {
            return Err(WhisperError::Corrupt("no archives".to_string()));
        }
        if archive_count > MAX_ARCHIVES {
            return Err(WhisperError::Corrupt(format!(
                "implausible archive count: {}",
                archive_count
            )));
        }

        let mut table = vec![0u8; archive_count as usize * ARCHIVE_INFO_SIZE];
        file.read_exact(&mut table)?;

        let mut archives = Vec::with_capacity(archive_count as usize);
        for i in 0..archive_count as usize {
            let at = i * ARCHIVE_INFO_SIZE;
            let info = ArchiveInfo {
                offset: read_u32(&table, at),
                retention: Retention {
                    seconds_per_point: read_u32(&table, at + 4),
                    points: read_u32(&table, at + 8),
                },
            };
            if info.retention.seconds_per_point == 0 || info.retention.points == 0 {
                return Err(WhisperError::Corrupt(format!(
                    "archive {} has a zero resolution or size",
                    i
                )));
            }
            archives.push(info);
        }

        // Archives must be ordered finest first with non-decreasing coverage.
        for pair in archives.windows(2) {
            if pair[1].retention.seconds_per_point < pair[0].retention.seconds_per_point
                || pair[1].retention.max_retention() < pair[0].retention.max_retention()
            {
                return Err(WhisperError::Corrupt(
                    "archives are not ordered finest-resolution first".to_string(),
                ));
            }
        }

        Ok(Self {
            file,
            aggregation_type,
            max_retention,
            x_files_factor,
            archives,
        })
    }

    pub fn retentions(&self) -> Vec<Retention> {
        self.archives.iter().map(|a| a.retention).collect()
    }

    /// Aggregation method name as stored in the header.
    pub fn aggregation_method(&self) -> &'static str {
        match self.aggregation_type {
            1 => "average",
            2 => "sum",
            3 => "last",
            4 => "max",
            5 => "min",
            _ => "unknown",
        }
    }

    pub fn max_retention(&self) -> u32 {
        self.max_retention
    }

    pub fn x_files_factor(&self) -> f32 {
        self.x_files_factor
    }

    /// Fetch the window `[from, until]`, reading from the finest archive
    /// that still covers `now - from`.
    ///
    /// Returns `Ok(None)` when the window lies entirely in the future or
    /// entirely beyond retention.
    pub fn fetch(&mut self, from: i64, until: i64) -> Result<Option<TimeSeries>, WhisperError> {
        let now = chrono::Utc::now().timestamp();
        self.fetch_at(from, until, now)
    }

    pub(crate) fn fetch_at(
        &mut self,
        mut from: i64,
        mut until: i64,
        now: i64,
    ) -> Result<Option<TimeSeries>, WhisperError> {
        if from > until {
            return Err(WhisperError::InvalidInterval { from, until });
        }

        let oldest = now - self.max_retention as i64;
        if from > now || until < oldest {
            return Ok(None);
        }
        if from < oldest {
            from = oldest;
        }
        if until > now {
            until = now;
        }

        let diff = now - from;
        let archive = *self
            .archives
            .iter()
            .find(|a| a.retention.max_retention() as i64 >= diff)
            .unwrap_or(self.archives.last().expect("validated non-empty"));

        let step = archive.retention.seconds_per_point as i64;
        let from_interval = interval_ceil(from, step);
        let until_interval = interval_ceil(until, step);
        let count = ((until_interval - from_interval) / step).max(0) as usize;

        let values = self.read_slots(&archive, from_interval, count)?;

        Ok(Some(TimeSeries {
            from_time: from_interval as u32,
            until_time: until_interval as u32,
            step: step as u32,
            values,
        }))
    }

    /// Read `count` consecutive slots starting at `from_interval` out of the
    /// archive's circular buffer. Slots whose stored interval does not match
    /// the expected one come back as NaN.
    fn read_slots(
        &mut self,
        archive: &ArchiveInfo,
        from_interval: i64,
        count: usize,
    ) -> Result<Vec<f64>, WhisperError> {
        let points = archive.retention.points as usize;
        let step = archive.retention.seconds_per_point as i64;

        let mut raw = vec![0u8; points * POINT_SIZE];
        self.file.seek(SeekFrom::Start(archive.offset as u64))?;
        self.file.read_exact(&mut raw)?;

        let slot_interval = |i: usize| read_u32(&raw, i * POINT_SIZE) as i64;
        let slot_value = |i: usize| {
            let at = i * POINT_SIZE + 4;
            f64::from_be_bytes([
                raw[at],
                raw[at + 1],
                raw[at + 2],
                raw[at + 3],
                raw[at + 4],
                raw[at + 5],
                raw[at + 6],
                raw[at + 7],
            ])
        };

        let base_interval = slot_interval(0);
        if base_interval == 0 {
            // Archive has never been written to.
            return Ok(vec![f64::NAN; count]);
        }

        let mut values = Vec::with_capacity(count);
        for i in 0..count {
            let expected = from_interval + i as i64 * step;
            let idx = ((expected - base_interval) / step).rem_euclid(points as i64) as usize;
            if slot_interval(idx) == expected {
                values.push(slot_value(idx));
            } else {
                values.push(f64::NAN);
            }
        }
        Ok(values)
    }
}

/// Align a timestamp up to the next archive interval boundary.
fn interval_ceil(t: i64, step: i64) -> i64 {
    t - t.rem_euclid(step) + step
}
