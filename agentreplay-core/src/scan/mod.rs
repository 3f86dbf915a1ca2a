//! Session discovery across agent-tool log directories
//!
//! A [`DirectoryScanner`] walks configured [`SourceRoot`]s with bounded glob
//! patterns and builds a [`SessionSummary`] per candidate file. Results are
//! cached per scan key for a short TTL.
//!
//! ## Cache keys
//!
//! | Scan | Key |
//! |------|-----|
//! | one root | `"<source>:<root>"` |
//! | all configured roots | `"__multi__"` |
//!
//! A multi-root scan bypasses the per-root cache for its sub-scans and
//! stores only the combined result.

mod summary;

pub use summary::{build_summary, project_name, SummaryLimits, GENERIC_ROOT_NAMES};

use crate::config::{expand_home, home_dir, ScannerConfig, SourceConfig};
use crate::error::{Error, Result};
use crate::ingest::subagents::SUBAGENTS_DIR;
use crate::types::{SessionSummary, Source};
use glob::Pattern;
use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

/// Cache key of the combined multi-root scan.
pub const MULTI_ROOT_KEY: &str = "__multi__";

/// One directory to scan, the tool that writes it and the file patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
    pub root: PathBuf,
    pub source: Source,
    /// Glob patterns relative to `root`
    pub patterns: Vec<String>,
}

impl SourceRoot {
    pub fn new(root: impl Into<PathBuf>, source: Source, patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            source,
            patterns,
        }
    }

    /// A root scanned with the source's default patterns.
    pub fn with_default_patterns(root: impl Into<PathBuf>, source: Source) -> Self {
        Self::new(root, source, Self::default_patterns(source))
    }

    /// Patterns used when a root does not name its own.
    ///
    /// Every pattern has a fixed depth; none recurses unboundedly.
    pub fn default_patterns(source: Source) -> Vec<String> {
        let patterns: &[&str] = match source {
            Source::Claude => &["*.jsonl", "*/*.jsonl"],
            // rollouts live under YYYY/MM/DD
            Source::Codex => &["*.jsonl", "*/*.jsonl", "*/*/*.jsonl", "*/*/*/*.jsonl"],
            Source::Gemini => &["*.jsonl", "*/logs.json", "*/session-*.jsonl"],
        };
        patterns.iter().map(|p| p.to_string()).collect()
    }

    /// Well-known log locations of each supported tool.
    pub fn defaults() -> Vec<SourceRoot> {
        let home = home_dir();
        vec![
            Self::with_default_patterns(home.join(".claude").join("projects"), Source::Claude),
            Self::with_default_patterns(home.join(".codex").join("sessions"), Source::Codex),
            Self::with_default_patterns(home.join(".gemini").join("tmp"), Source::Gemini),
        ]
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        let patterns = if config.patterns.is_empty() {
            Self::default_patterns(config.source)
        } else {
            config.patterns.clone()
        };
        Self::new(expand_home(&config.root), config.source, patterns)
    }

    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.source, self.root.display())
    }
}

/// Whether a scan may answer from, and store into, the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Use,
    Bypass,
}

#[derive(Debug)]
struct CacheEntry {
    summaries: Arc<Vec<SessionSummary>>,
    stored_at: Instant,
}

/// Scanner context: sources, limits and the scan cache.
///
/// Construct one per process (or per test) and share it by reference.
#[derive(Debug)]
pub struct DirectoryScanner {
    sources: Vec<SourceRoot>,
    pinned: Option<PathBuf>,
    limits: SummaryLimits,
    cache_ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
    scans: AtomicU64,
}

impl DirectoryScanner {
    /// Build a scanner from configuration.
    ///
    /// `data_dir` pins scanning to that one directory. Otherwise the
    /// configured sources are used, or [`SourceRoot::defaults`] when none are.
    pub fn new(config: &ScannerConfig) -> Self {
        let sources = if config.sources.is_empty() {
            SourceRoot::defaults()
        } else {
            config.sources.iter().map(SourceRoot::from_config).collect()
        };
        let mut scanner = Self::with_sources(sources, config);
        scanner.pinned = config.data_dir.as_deref().map(expand_home);
        scanner
    }

    /// Build a scanner over explicit roots, ignoring `config.sources` and
    /// `config.data_dir`.
    pub fn with_sources(sources: Vec<SourceRoot>, config: &ScannerConfig) -> Self {
        Self {
            sources,
            pinned: None,
            limits: SummaryLimits {
                metadata_line_limit: config.metadata_line_limit,
                project_name_max_chars: config.project_name_max_chars,
                active_threshold: config.active_threshold(),
            },
            cache_ttl: config.cache_ttl(),
            cache: Mutex::new(HashMap::new()),
            scans: AtomicU64::new(0),
        }
    }

    /// Build a scanner pinned to one directory labelled as Claude Code.
    pub fn pinned(dir: impl Into<PathBuf>, config: &ScannerConfig) -> Self {
        let mut scanner = Self::with_sources(Vec::new(), config);
        scanner.pinned = Some(dir.into());
        scanner
    }

    pub fn sources(&self) -> &[SourceRoot] {
        &self.sources
    }

    pub fn pinned_dir(&self) -> Option<&Path> {
        self.pinned.as_deref()
    }

    /// Number of scans that actually globbed the filesystem.
    pub fn scans_performed(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Drop every cached result.
    pub fn invalidate(&self) {
        self.cache().clear();
    }

    /// List known sessions, active first, then most recently modified.
    ///
    /// Across several roots, a root that fails to scan is logged and left
    /// out. A pinned directory reports its error.
    pub fn scan(&self) -> Result<Arc<Vec<SessionSummary>>> {
        if let Some(dir) = &self.pinned {
            let root = SourceRoot::with_default_patterns(dir.clone(), Source::default());
            return self.scan_root(&root, CachePolicy::Use);
        }

        if let Some(hit) = self.cached(MULTI_ROOT_KEY) {
            return Ok(hit);
        }

        let mut all = Vec::new();
        for root in &self.sources {
            if !root.root.is_dir() {
                tracing::debug!(root = %root.root.display(), "Source root missing, skipping");
                continue;
            }
            match self.scan_root(root, CachePolicy::Bypass) {
                Ok(summaries) => all.extend(summaries.iter().cloned()),
                Err(e) => {
                    tracing::warn!(
                        root = %root.root.display(),
                        source = %root.source,
                        error = %e,
                        "Source root failed to scan, skipping"
                    );
                }
            }
        }
        sort_summaries(&mut all);

        let all = Arc::new(all);
        self.store(MULTI_ROOT_KEY, &all);
        Ok(all)
    }

    /// Scan a single root.
    ///
    /// A missing root yields an empty list. A pattern that does not compile
    /// fails with [`Error::InvalidPattern`].
    pub fn scan_root(
        &self,
        root: &SourceRoot,
        policy: CachePolicy,
    ) -> Result<Arc<Vec<SessionSummary>>> {
        let key = root.cache_key();
        if policy == CachePolicy::Use {
            if let Some(hit) = self.cached(&key) {
                return Ok(hit);
            }
        }

        if !root.root.is_dir() {
            return Ok(Arc::new(Vec::new()));
        }

        let candidates = candidates(root)?;
        self.scans.fetch_add(1, Ordering::Relaxed);

        let now = SystemTime::now();
        let mut summaries = Vec::with_capacity(candidates.len());
        for path in &candidates {
            match build_summary(path, root.source, now, &self.limits) {
                Ok(Some(summary)) => summaries.push(summary),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable session file"
                    );
                }
            }
        }
        sort_summaries(&mut summaries);

        tracing::debug!(
            root = %root.root.display(),
            source = %root.source,
            candidates = candidates.len(),
            sessions = summaries.len(),
            "Scanned source root"
        );

        let summaries = Arc::new(summaries);
        if policy == CachePolicy::Use {
            self.store(&key, &summaries);
        }
        Ok(summaries)
    }

    /// Resolve a session id or file path to a transcript path.
    ///
    /// An existing path is used as-is; otherwise the scan is searched for a
    /// summary with that id or file path. When pinned, the result must lie
    /// inside the pinned directory.
    pub fn resolve_session(&self, id_or_path: &str) -> Result<PathBuf> {
        let direct = PathBuf::from(id_or_path);
        let resolved = if !id_or_path.is_empty() && direct.is_file() {
            Some(direct)
        } else {
            self.scan()?
                .iter()
                .find(|s| s.id == id_or_path || s.file_path == id_or_path)
                .map(|s| PathBuf::from(&s.file_path))
        };

        let Some(path) = resolved else {
            return Err(Error::SessionNotFound(id_or_path.to_string()));
        };

        if let Some(pinned) = &self.pinned {
            let inside = match (path.canonicalize(), pinned.canonicalize()) {
                (Ok(p), Ok(base)) => p.starts_with(base),
                _ => false,
            };
            if !inside {
                tracing::warn!(
                    requested = %id_or_path,
                    pinned = %pinned.display(),
                    "Rejected session path outside the pinned directory"
                );
                return Err(Error::SessionNotFound(id_or_path.to_string()));
            }
        }

        Ok(path)
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // entries are pure functions of disk state; a poisoned map is still usable
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cached(&self, key: &str) -> Option<Arc<Vec<SessionSummary>>> {
        let cache = self.cache();
        cache
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.cache_ttl)
            .map(|entry| Arc::clone(&entry.summaries))
    }

    fn store(&self, key: &str, summaries: &Arc<Vec<SessionSummary>>) {
        self.cache().insert(
            key.to_string(),
            CacheEntry {
                summaries: Arc::clone(summaries),
                stored_at: Instant::now(),
            },
        );
    }
}

/// Glob a root's patterns into a sorted, de-duplicated candidate list.
fn candidates(root: &SourceRoot) -> Result<BTreeSet<PathBuf>> {
    let base = Pattern::escape(&root.root.to_string_lossy());
    let mut found = BTreeSet::new();

    for pattern in &root.patterns {
        let full = format!("{}/{}", base, pattern);
        let paths = glob::glob(&full).map_err(|e| Error::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;

        for entry in paths {
            match entry {
                Ok(path) if path.is_file() && !is_subagent_path(&root.root, &path) => {
                    found.insert(path);
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "Unreadable glob entry"),
            }
        }
    }

    Ok(found)
}

/// True when any component below `root` is the sub-agent directory.
fn is_subagent_path(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .any(|c| matches!(c, Component::Normal(name) if name == SUBAGENTS_DIR))
}

fn sort_summaries(summaries: &mut [SessionSummary]) {
    summaries.sort_by(|a, b| {
        (b.is_active, b.last_modified).cmp(&(a.is_active, a.last_modified))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config() -> ScannerConfig {
        ScannerConfig::default()
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_default_roots() {
        let roots = SourceRoot::defaults();
        assert_eq!(roots.len(), 3);
        assert!(roots[0].root.ends_with(".claude/projects"));
        assert_eq!(roots[1].source, Source::Codex);
        assert!(roots[2].patterns.contains(&"*/logs.json".to_string()));
    }

    #[test]
    fn test_cache_key() {
        let root = SourceRoot::with_default_patterns("/data", Source::Gemini);
        assert_eq!(root.cache_key(), "gemini:/data");
    }

    #[test]
    fn test_subagent_files_are_excluded() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("proj/s1.jsonl"), "{}\n");
        write(&temp.path().join("proj/s1/subagents/agent-a.jsonl"), "{}\n");
        write(&temp.path().join("s2.jsonl"), "{}\n");

        let scanner = DirectoryScanner::pinned(temp.path(), &config());
        let summaries = scanner.scan().unwrap();

        let mut ids: Vec<&str> = summaries.iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert!(summaries.iter().all(|s| s.source == Source::Claude));
        let s1 = summaries.iter().find(|s| s.id == "s1").unwrap();
        assert_eq!(s1.agent_count, 2);
    }

    #[test]
    fn test_root_named_subagents_is_not_excluded() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("subagents");
        write(&root.join("top.jsonl"), "{}\n");

        let scanner = DirectoryScanner::pinned(&root, &config());
        assert_eq!(scanner.scan().unwrap().len(), 1);
    }

    #[test]
    fn test_depth_is_bounded() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("a/b/c/deep.jsonl"), "{}\n");
        let scanner = DirectoryScanner::pinned(temp.path(), &config());
        assert!(scanner.scan().unwrap().is_empty());
    }

    #[test]
    fn test_cache_hit_within_ttl() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("p/s.jsonl"), "{}\n");

        let scanner = DirectoryScanner::pinned(temp.path(), &config());
        let first = scanner.scan().unwrap();
        let second = scanner.scan().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(scanner.scans_performed(), 1);

        scanner.invalidate();
        let third = scanner.scan().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(scanner.scans_performed(), 2);
    }

    #[test]
    fn test_zero_ttl_always_rescans() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("p/s.jsonl"), "{}\n");
        let config = ScannerConfig {
            cache_ttl_secs: 0,
            ..Default::default()
        };

        let scanner = DirectoryScanner::pinned(temp.path(), &config);
        scanner.scan().unwrap();
        scanner.scan().unwrap();
        assert_eq!(scanner.scans_performed(), 2);
    }

    #[test]
    fn test_multi_root_scan() {
        let temp = TempDir::new().unwrap();
        let claude = temp.path().join("claude");
        let codex = temp.path().join("codex");
        write(&claude.join("proj/c.jsonl"), "{\"type\":\"user\",\"sessionId\":\"c1\"}\n");
        write(
            &codex.join("2025/01/02/rollout.jsonl"),
            "{\"type\":\"session_meta\",\"payload\":{\"id\":\"x1\"}}\n",
        );

        let scanner = DirectoryScanner::with_sources(
            vec![
                SourceRoot::with_default_patterns(&claude, Source::Claude),
                SourceRoot::with_default_patterns(&codex, Source::Codex),
                SourceRoot::with_default_patterns(temp.path().join("missing"), Source::Gemini),
            ],
            &config(),
        );

        let summaries = scanner.scan().unwrap();
        assert_eq!(summaries.len(), 2);
        let codex_summary = summaries.iter().find(|s| s.id == "x1").unwrap();
        assert_eq!(codex_summary.source, Source::Codex);
        assert_eq!(scanner.scans_performed(), 2);

        let again = scanner.scan().unwrap();
        assert!(Arc::ptr_eq(&summaries, &again));
        assert_eq!(scanner.scans_performed(), 2);

        // sub-scans bypassed the per-root cache
        let claude_root = &scanner.sources()[0];
        scanner.scan_root(claude_root, CachePolicy::Use).unwrap();
        assert_eq!(scanner.scans_performed(), 3);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let temp = TempDir::new().unwrap();
        let root = SourceRoot::new(temp.path(), Source::Claude, vec!["[".to_string()]);
        let scanner = DirectoryScanner::with_sources(vec![], &config());

        let err = scanner.scan_root(&root, CachePolicy::Bypass).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_bad_root_does_not_hide_good_roots() {
        let temp = TempDir::new().unwrap();
        let claude = temp.path().join("claude");
        let codex = temp.path().join("codex");
        write(&claude.join("proj/c.jsonl"), "{\"type\":\"user\",\"sessionId\":\"c1\"}\n");
        fs::create_dir_all(&codex).unwrap();

        let scanner = DirectoryScanner::with_sources(
            vec![
                SourceRoot::with_default_patterns(&claude, Source::Claude),
                SourceRoot::new(&codex, Source::Codex, vec!["[".to_string()]),
            ],
            &config(),
        );

        let summaries = scanner.scan().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "c1");
    }

    #[test]
    fn test_active_sessions_sort_first() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("p/fresh.jsonl"), "{}\n");
        write(&temp.path().join("q/stale.jsonl"), "{}\n");
        let stale = fs::File::options()
            .append(true)
            .open(temp.path().join("q/stale.jsonl"))
            .unwrap();
        stale
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        let scanner = DirectoryScanner::pinned(temp.path(), &config());
        let summaries = scanner.scan().unwrap();
        assert_eq!(summaries[0].id, "fresh");
        assert!(summaries[0].is_active);
        assert!(!summaries[1].is_active);
    }

    #[test]
    fn test_resolve_session() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p/known.jsonl");
        write(&path, "{\"type\":\"user\",\"sessionId\":\"sid-9\"}\n");

        let scanner = DirectoryScanner::pinned(temp.path(), &config());
        assert_eq!(scanner.resolve_session("sid-9").unwrap(), path);
        assert_eq!(scanner.resolve_session(&path.to_string_lossy()).unwrap(), path);

        let err = scanner.resolve_session("unknown").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_resolve_rejects_paths_outside_pinned_dir() {
        let pinned = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let foreign = outside.path().join("secret.jsonl");
        write(&foreign, "{}\n");

        let scanner = DirectoryScanner::pinned(pinned.path(), &config());
        let err = scanner.resolve_session(&foreign.to_string_lossy()).unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));

        let traversal = format!("{}/../{}", pinned.path().display(), foreign.display());
        assert!(scanner.resolve_session(&traversal).is_err());
    }
}
