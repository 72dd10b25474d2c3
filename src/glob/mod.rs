//! Glob expansion over the metric tree
//!
//! Turns a dotted, brace/wildcard query into the set of matching metrics and
//! directories. Two answering branches:
//!
//! - **index**: trigram candidate lookup against the published snapshot,
//!   confirmed by a full glob match (wildcard and class constraints are not
//!   enforced by trigrams);
//! - **filesystem**: per-component directory expansion rooted at the data
//!   directory, used when no snapshot exists, when the pattern is a plain
//!   prefix/exact lookup, or when a candidate has no usable trigram.
//!
//! Results from the index branch come back sorted; the filesystem branch
//! keeps directory-listing order. Callers needing determinism must sort.

use crate::index::{trigram, Snapshot};
use globset::{GlobBuilder, GlobMatcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One discovery result, back in dotted form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobMatch {
    pub path: String,
    pub is_leaf: bool,
}

/// Expands queries against one data root.
#[derive(Debug, Clone)]
pub struct Expander {
    root: PathBuf,
    max_globs: usize,
}

impl Expander {
    pub fn new(root: impl Into<PathBuf>, max_globs: usize) -> Self {
        Self {
            root: root.into(),
            max_globs,
        }
    }

    /// Expand `query` into matching paths, each flagged leaf (a `.wsp`
    /// metric) or non-leaf (a directory). Entries that cannot be stat'ed
    /// are dropped.
    pub fn expand(&self, snapshot: Option<&Snapshot>, query: &str) -> Vec<GlobMatch> {
        let use_fs = use_filesystem_glob(query);
        let query = query.replace('.', "/");

        // A trailing token can be either a directory or a metric file, so
        // both spellings are candidates.
        let mut candidates = Vec::with_capacity(2);
        if !query.ends_with('*') {
            candidates.push(format!("{query}.wsp"));
        }
        candidates.push(query);
        let candidates = expand_braces(candidates, self.max_globs);

        let mut files: Vec<PathBuf> = Vec::new();

        match snapshot {
            Some(snapshot) if !use_fs => {
                let mut docs: HashSet<u32> = HashSet::new();
                let mut unindexable = Vec::new();

                for glob in &candidates {
                    let trigrams = trigram::pattern_trigrams(glob);
                    if trigrams.is_empty() {
                        // No literal run to look up; this candidate goes to
                        // the filesystem below.
                        unindexable.push(glob);
                        continue;
                    }

                    let matcher = match compile(&format!("/{glob}")) {
                        Some(m) => m,
                        None => {
                            tracing::debug!(glob = %glob, "unparsable glob candidate");
                            continue;
                        }
                    };
                    for id in snapshot.candidates(&trigrams) {
                        if !docs.contains(&id) && matcher.is_match(snapshot.path(id)) {
                            docs.insert(id);
                        }
                    }
                }

                let mut indexed: Vec<PathBuf> = docs
                    .into_iter()
                    .map(|id| self.root.join(snapshot.path(id).trim_start_matches('/')))
                    .collect();
                indexed.sort_unstable();
                files.extend(indexed);

                for glob in unindexable {
                    files.extend(filesystem_glob(&self.root, glob));
                }
            }
            _ => {
                for glob in &candidates {
                    files.extend(filesystem_glob(&self.root, glob));
                }
            }
        }

        let mut seen = HashSet::new();
        let mut matches = Vec::with_capacity(files.len());
        for full in files {
            let meta = match std::fs::metadata(&full) {
                Ok(m) => m,
                Err(_) => continue,
            };
            let rel = match full.strip_prefix(&self.root) {
                Ok(r) => r,
                Err(_) => continue,
            };

            let mut name = rel.to_string_lossy().replace('/', ".");
            let is_leaf = !meta.is_dir() && name.ends_with(".wsp");
            if is_leaf {
                name.truncate(name.len() - ".wsp".len());
            }
            if seen.insert(name.clone()) {
                matches.push(GlobMatch { path: name, is_leaf });
            }
        }
        matches
    }
}

/// A pattern with no `[`/`?` and at most a single trailing `*` is a plain
/// prefix or exact lookup; a constant-depth directory listing answers it
/// faster than the index.
fn use_filesystem_glob(query: &str) -> bool {
    if query.contains('[') || query.contains('?') {
        return false;
    }
    match query.find('*') {
        None => true,
        Some(at) => at == query.len() - 1,
    }
}

/// Repeatedly substitute the leftmost `{a,b,...}` group of every candidate,
/// capping the live candidate count at `max_globs`. Overflowing alternatives
/// are dropped.
fn expand_braces(mut globs: Vec<String>, max_globs: usize) -> Vec<String> {
    loop {
        let mut expanded = false;
        let mut next: Vec<String> = Vec::with_capacity(globs.len());

        for glob in &globs {
            let lbrace = glob.find('{');
            let rbrace = lbrace.and_then(|l| glob[l..].find('}').map(|r| l + r));

            if let (Some(l), Some(r)) = (lbrace, rbrace) {
                expanded = true;
                for part in glob[l + 1..r].split(',') {
                    if next.len() > max_globs {
                        break;
                    }
                    next.push(format!("{}{}{}", &glob[..l], part, &glob[r + 1..]));
                }
            } else {
                if next.len() > max_globs {
                    break;
                }
                next.push(glob.clone());
            }
        }

        globs = next;
        if !expanded {
            return globs;
        }
    }
}

fn compile(pattern: &str) -> Option<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .ok()
        .map(|g| g.compile_matcher())
}

/// Expand one slash-separated pattern against the filesystem, component by
/// component. Literal components are probed directly; wildcard components
/// filter a sorted directory listing.
fn filesystem_glob(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let mut current = vec![root.to_path_buf()];

    for comp in pattern.split('/') {
        if comp.is_empty() {
            continue;
        }
        let mut next = Vec::new();

        if !comp.contains(['*', '?', '[']) {
            for dir in &current {
                let candidate = dir.join(comp);
                if candidate.symlink_metadata().is_ok() {
                    next.push(candidate);
                }
            }
        } else {
            let matcher = match compile(comp) {
                Some(m) => m,
                None => return Vec::new(),
            };
            for dir in &current {
                let entries = match std::fs::read_dir(dir) {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                let mut names: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort_unstable();
                for name in names {
                    if matcher.is_match(&name) {
                        next.push(dir.join(&name));
                    }
                }
            }
        }

        current = next;
        if current.is_empty() {
            break;
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn snapshot(paths: &[&str]) -> Snapshot {
        Snapshot::build(paths.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_use_filesystem_glob_decision() {
        assert!(use_filesystem_glob("carbon.relays"));
        assert!(use_filesystem_glob("carbon.re"));
        assert!(use_filesystem_glob("carbon.*"));
        assert!(!use_filesystem_glob("carbon.*.agents"));
        assert!(!use_filesystem_glob("carbon.[rz]"));
        assert!(!use_filesystem_glob("carbon.re?ays"));
        assert!(!use_filesystem_glob("carbon.{re,zi}*x"));
    }

    #[test]
    fn test_expand_braces_single_group() {
        let out = expand_braces(vec!["a/{b,c}/d".to_string()], 10);
        assert_eq!(out, vec!["a/b/d", "a/c/d"]);
    }

    #[test]
    fn test_expand_braces_nested_rounds() {
        let out = expand_braces(vec!["{a,b}/{c,d}".to_string()], 10);
        assert_eq!(out, vec!["a/c", "a/d", "b/c", "b/d"]);
    }

    #[test]
    fn test_expand_braces_capped() {
        let out = expand_braces(vec!["x/{a,b,c,d,e,f,g,h}".to_string()], 3);
        assert!(out.len() <= 4, "cap overflow: {out:?}");
    }

    #[test]
    fn test_brace_query_against_snapshot() {
        // Matches the on-disk tree: a/b/d.wsp is a metric, a/c/d a directory.
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::create_dir_all(dir.path().join("a/c/d")).unwrap();
        fs::write(dir.path().join("a/b/d.wsp"), b"").unwrap();

        let snap = snapshot(&["/a", "/a/b", "/a/b/d.wsp", "/a/c", "/a/c/d"]);
        let expander = Expander::new(dir.path(), 10);

        let matches = expander.expand(Some(&snap), "a.{b,c}.d");
        assert_eq!(
            matches,
            vec![
                GlobMatch {
                    path: "a.b.d".to_string(),
                    is_leaf: true
                },
                GlobMatch {
                    path: "a.c.d".to_string(),
                    is_leaf: false
                },
            ]
        );
    }

    #[test]
    fn test_index_branch_is_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("m")).unwrap();
        for name in ["zeta", "alpha", "mid"] {
            fs::write(dir.path().join(format!("m/{name}.wsp")), b"").unwrap();
        }

        // Walk order is deliberately unsorted in the snapshot.
        let snap = snapshot(&["/m", "/m/zeta.wsp", "/m/alpha.wsp", "/m/mid.wsp"]);
        let expander = Expander::new(dir.path(), 10);

        let matches = expander.expand(Some(&snap), "m.*a");
        let paths: Vec<&str> = matches.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["m.alpha", "m.zeta"]);
    }

    #[test]
    fn test_candidate_without_trigrams_hits_filesystem() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("m")).unwrap();
        for name in ["alpha", "mid"] {
            fs::write(dir.path().join(format!("m/{name}.wsp")), b"").unwrap();
        }

        // "m.[a-z]*" leaves no literal run of length 3, so even with a
        // snapshot present the lookup must go to the filesystem.
        let snap = snapshot(&["/stale/other.wsp"]);
        let expander = Expander::new(dir.path(), 10);

        let matches = expander.expand(Some(&snap), "m.[a-z]*");
        let mut paths: Vec<&str> = matches.iter().map(|m| m.path.as_str()).collect();
        paths.sort_unstable();
        assert_eq!(paths, vec!["m.alpha", "m.mid"]);
    }

    #[test]
    fn test_pruned_trigrams_recovered_by_match() {
        // 1000 sibling metrics: every trigram of the query's literal runs is
        // shared by all of them and gets pruned, leaving no candidate
        // constraint. The glob match over the full path list recovers the
        // real matches.
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("foo")).unwrap();
        for i in 0..10 {
            fs::write(dir.path().join(format!("foo/bar{i}.wsp")), b"").unwrap();
        }

        let paths: Vec<String> = (0..1000).map(|i| format!("/foo/bar{i}.wsp")).collect();
        let snap = Snapshot::build(paths);
        assert!(snap.pruned_trigrams() > 0);

        let expander = Expander::new(dir.path(), 10);
        let matches = expander.expand(Some(&snap), "foo.bar[0-9]");

        assert_eq!(matches.len(), 10);
        assert!(matches.iter().all(|m| m.is_leaf));
    }

    #[test]
    fn test_filesystem_fallback_without_snapshot() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("servers/web1")).unwrap();
        fs::create_dir_all(dir.path().join("servers/web2")).unwrap();
        fs::write(dir.path().join("servers/web1/cpu.wsp"), b"").unwrap();
        fs::write(dir.path().join("servers/web2/cpu.wsp"), b"").unwrap();

        let expander = Expander::new(dir.path(), 10);
        let matches = expander.expand(None, "servers.*.cpu");

        let mut paths: Vec<&str> = matches.iter().map(|m| m.path.as_str()).collect();
        paths.sort_unstable();
        assert_eq!(paths, vec!["servers.web1.cpu", "servers.web2.cpu"]);
        assert!(matches.iter().all(|m| m.is_leaf));
    }

    #[test]
    fn test_trailing_star_uses_filesystem() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("carbon/relays")).unwrap();
        fs::write(dir.path().join("carbon/agents.wsp"), b"").unwrap();

        // Snapshot is deliberately stale/empty: the prefix shortcut must not
        // consult it.
        let snap = snapshot(&[]);
        let expander = Expander::new(dir.path(), 10);

        let matches = expander.expand(Some(&snap), "carbon.*");
        let mut paths: Vec<(&str, bool)> =
            matches.iter().map(|m| (m.path.as_str(), m.is_leaf)).collect();
        paths.sort_unstable();
        assert_eq!(
            paths,
            vec![("carbon.agents", true), ("carbon.relays", false)]
        );
    }

    #[test]
    fn test_exact_lookup_both_spellings() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("carbon/relays")).unwrap();
        fs::write(dir.path().join("carbon/relays.wsp"), b"").unwrap();

        let expander = Expander::new(dir.path(), 10);
        let matches = expander.expand(None, "carbon.relays");

        // Same dotted name twice: once as metric, once as directory; the
        // leaf spelling wins the dedup because the .wsp candidate runs first.
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].path, "carbon.relays");
        assert!(matches[0].is_leaf);
    }

    #[test]
    fn test_missing_path_yields_nothing() {
        let dir = tempdir().unwrap();
        let expander = Expander::new(dir.path(), 10);
        assert!(expander.expand(None, "no.such.metric").is_empty());
    }
}
