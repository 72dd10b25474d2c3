//! Published index snapshot
//!
//! A snapshot is immutable once built: the ordered list of paths the walk
//! produced (directories and `.wsp` files, leading-slash relative), an
//! inverted trigram → path-id index, and the count of known metrics.
//!
//! Posting lists longer than 95% of the path count carry no selectivity and
//! are pruned; a pruned trigram places no constraint on candidates and the
//! caller's full glob match filters the survivors.

use crate::index::trigram::{self, Trigram};
use std::collections::{HashMap, HashSet};

/// Fraction of all paths above which a posting list is pruned.
const PRUNE_THRESHOLD: f64 = 0.95;

/// Immutable view of the Whisper tree at one point in time.
#[derive(Debug)]
pub struct Snapshot {
    /// Every path the walk saw, in walk order. Not sorted.
    paths: Vec<String>,
    /// Trigram → ascending path ids. Pruned trigrams are absent here.
    postings: HashMap<Trigram, Vec<u32>>,
    /// Trigrams dropped by pruning; they match everything.
    pruned: HashSet<Trigram>,
    known_metrics: u64,
}

impl Snapshot {
    /// Build the inverted index over `paths`.
    pub fn build(paths: Vec<String>) -> Self {
        let known_metrics = paths.iter().filter(|p| p.ends_with(".wsp")).count() as u64;

        let mut postings: HashMap<Trigram, Vec<u32>> = HashMap::new();
        let mut windows = Vec::new();
        for (id, path) in paths.iter().enumerate() {
            let id = id as u32;
            windows.clear();
            trigram::extract_into(path, &mut windows);
            for &t in &windows {
                let list = postings.entry(t).or_default();
                // Ids arrive in order, so a repeated trigram within one path
                // is always the current tail.
                if list.last() != Some(&id) {
                    list.push(id);
                }
            }
        }

        let cutoff = (paths.len() as f64 * PRUNE_THRESHOLD) as usize;
        let mut pruned = HashSet::new();
        postings.retain(|&t, list| {
            if list.len() > cutoff {
                pruned.insert(t);
                false
            } else {
                true
            }
        });

        Self {
            paths,
            postings,
            pruned,
            known_metrics,
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn path(&self, id: u32) -> &str {
        &self.paths[id as usize]
    }

    /// Number of `.wsp` paths in the snapshot.
    pub fn known_metrics(&self) -> u64 {
        self.known_metrics
    }

    /// Number of trigrams dropped by pruning.
    pub fn pruned_trigrams(&self) -> usize {
        self.pruned.len()
    }

    /// Path ids that may match a pattern with the given trigrams.
    ///
    /// Pruned trigrams place no constraint. A trigram the snapshot has never
    /// seen rules out every path. When nothing constrains (all query trigrams
    /// pruned, or none supplied) every id is a candidate and the caller's
    /// match step does the filtering.
    pub fn candidates(&self, trigrams: &[Trigram]) -> Vec<u32> {
        let mut lists: Vec<&Vec<u32>> = Vec::new();
        for t in trigrams {
            if self.pruned.contains(t) {
                continue;
            }
            match self.postings.get(t) {
                Some(list) => lists.push(list),
                None => return Vec::new(),
            }
        }

        if lists.is_empty() {
            return (0..self.paths.len() as u32).collect();
        }

        // Intersect starting from the most selective list.
        lists.sort_by_key(|l| l.len());
        let mut result = lists[0].clone();
        for list in &lists[1..] {
            result.retain(|id| list.binary_search(id).is_ok());
            if result.is_empty() {
                break;
            }
        }
        result
    }
}
