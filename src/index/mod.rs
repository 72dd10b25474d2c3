//! Metric path index
//!
//! Discovery queries are answered from an immutable snapshot of the Whisper
//! tree instead of walking the filesystem:
//!
//! - **trigram**: 3-byte windows over paths and glob patterns
//! - **snapshot**: ordered path list + pruned inverted trigram index
//! - **builder**: background walk that builds and atomically publishes
//!   fresh snapshots
//!
//! ```text
//! Query: "servers.{web,db}*.cpu"
//!        ↓
//! pattern trigrams: "ser", "erv", ..., "cpu"
//!        ↓
//! posting-list intersection → candidate path ids
//!        ↓
//! full glob match against snapshot paths → matches
//! ```
//!
//! Readers take one snapshot pointer per request and never lock; the builder
//! swaps the published pointer when a new walk completes.

mod builder;
mod snapshot;
pub mod trigram;

pub use builder::{IndexBuilder, PathIndex};
pub use snapshot::Snapshot;
pub use trigram::Trigram;
