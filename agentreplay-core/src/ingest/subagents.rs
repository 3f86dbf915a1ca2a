//! Sub-agent log discovery
//!
//! Claude Code stores the logs of spawned sub-agents next to the session log
//! in one of two layouts:
//!
//! ```text
//! <dir>/<file-stem>/subagents/agent-<id>.jsonl
//! <dir>/<session-id>/subagents/agent-<id>.jsonl
//! ```
//!
//! The layouts are probed in that order and the first directory that exists
//! wins. The two are never merged.

use glob::Pattern;
use std::path::{Path, PathBuf};

/// Directory name holding sub-agent logs.
pub const SUBAGENTS_DIR: &str = "subagents";

/// File name prefix of a sub-agent log.
pub const AGENT_FILE_PREFIX: &str = "agent-";

/// Return the sub-agent directory for a session log, if one exists.
pub fn subagent_dir(session_path: &Path, session_id: &str) -> Option<PathBuf> {
    let parent = session_path.parent()?;
    let stem = session_path.file_stem()?;

    let by_stem = parent.join(stem).join(SUBAGENTS_DIR);
    if by_stem.is_dir() {
        return Some(by_stem);
    }

    if session_id.is_empty() {
        return None;
    }
    let by_session = parent.join(session_id).join(SUBAGENTS_DIR);
    by_session.is_dir().then_some(by_session)
}

/// Discover the sub-agent logs of a session, sorted by path.
pub fn discover(session_path: &Path, session_id: &str) -> Vec<PathBuf> {
    let Some(dir) = subagent_dir(session_path, session_id) else {
        return Vec::new();
    };

    let pattern = format!(
        "{}/{}*.jsonl",
        Pattern::escape(&dir.to_string_lossy()),
        AGENT_FILE_PREFIX
    );
    let mut files: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(paths) => paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::debug!(error = %e, "Unreadable sub-agent entry");
                    None
                }
            })
            .filter(|p| p.is_file())
            .collect(),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "Invalid sub-agent pattern");
            Vec::new()
        }
    };
    files.sort();

    tracing::debug!(
        dir = %dir.display(),
        count = files.len(),
        "Discovered sub-agent logs"
    );
    files
}

/// Number of sub-agent logs a session has.
pub fn count(session_path: &Path, session_id: &str) -> usize {
    discover(session_path, session_id).len()
}

/// Agent id implied by a sub-agent file name.
///
/// Given `agent-a4767a09.jsonl`, returns `"a4767a09"`. Names without the
/// prefix return the bare stem.
pub fn fallback_agent_id(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.strip_prefix(AGENT_FILE_PREFIX) {
        Some(id) => id.to_string(),
        None => stem,
    }
}
