//! Parse-light session summaries
//!
//! A summary is built from the file's metadata, its line count and the
//! first few records only. No events are produced here.

use crate::error::Result;
use crate::ingest::lines::{parse_object, LossyLines};
use crate::ingest::subagents;
use crate::types::{SessionSummary, Source};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Parent directory names too generic to identify a project.
pub const GENERIC_ROOT_NAMES: &[&str] = &["projects", "sessions", "tmp"];

/// Bounds applied while building one summary.
#[derive(Debug, Clone, Copy)]
pub struct SummaryLimits {
    /// Records at the head of the file inspected for metadata
    pub metadata_line_limit: usize,
    /// Stem characters kept when the parent dir name is generic
    pub project_name_max_chars: usize,
    /// Freshness window for `is_active`
    pub active_threshold: Duration,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        Self {
            metadata_line_limit: 20,
            project_name_max_chars: 20,
            active_threshold: Duration::from_secs(60),
        }
    }
}

/// Metadata gathered from the head of a file.
#[derive(Debug, Default)]
struct HeadMetadata {
    session_id: Option<String>,
    slug: String,
    branch: String,
    input_tokens: u64,
    output_tokens: u64,
    cache_tokens: u64,
}

/// Build the summary of one session file.
///
/// Returns `Ok(None)` for a JSON document that does not decode; I/O errors
/// are returned so the caller can log and omit the file.
pub fn build_summary(
    path: &Path,
    source: Source,
    now: SystemTime,
    limits: &SummaryLimits,
) -> Result<Option<SessionSummary>> {
    let modified = std::fs::metadata(path)?.modified()?;
    // A timestamp in the future counts as just modified
    let age = now.duration_since(modified).unwrap_or_default();
    let is_active = age < limits.active_threshold;

    let is_json = path.extension().is_some_and(|e| e == "json");
    let (line_count, meta) = if is_json {
        match read_json_document(path)? {
            Some(found) => found,
            None => return Ok(None),
        }
    } else {
        read_jsonl(path, source, limits.metadata_line_limit)?
    };

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let id = meta.session_id.clone().unwrap_or_else(|| stem.clone());

    let agent_count = match source {
        Source::Claude => 1 + subagents::count(path, &id),
        _ => 1,
    };

    Ok(Some(SessionSummary {
        project_name: project_name(path, limits.project_name_max_chars),
        file_path: path.to_string_lossy().into_owned(),
        event_count: line_count,
        agent_count,
        is_active,
        last_modified: DateTime::<Utc>::from(modified),
        total_input_tokens: meta.input_tokens,
        total_output_tokens: meta.output_tokens,
        total_cache_tokens: meta.cache_tokens,
        slug: meta.slug,
        branch: meta.branch,
        source,
        id,
    }))
}

/// Project label for a session file.
///
/// The parent directory name, unless it is one of [`GENERIC_ROOT_NAMES`];
/// then the first `max_chars` characters of the file stem.
pub fn project_name(path: &Path, max_chars: usize) -> String {
    let parent = path
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if GENERIC_ROOT_NAMES.contains(&parent.as_str()) {
        path.file_stem()
            .map(|s| s.to_string_lossy().chars().take(max_chars).collect())
            .unwrap_or_default()
    } else {
        parent
    }
}

/// Count non-empty lines and inspect the first `line_limit` for metadata.
fn read_jsonl(path: &Path, source: Source, line_limit: usize) -> Result<(usize, HeadMetadata)> {
    let file = File::open(path)?;
    let mut meta = HeadMetadata::default();
    let mut line_count = 0usize;

    for (index, line) in LossyLines::new(BufReader::new(file)).enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        line_count += 1;

        if index >= line_limit {
            continue;
        }
        let Some(record) = parse_object(&line) else {
            continue;
        };
        match source {
            Source::Claude => claude_metadata(&record, &mut meta),
            Source::Codex => codex_metadata(&record, &mut meta),
            Source::Gemini => gemini_metadata(&record, &mut meta),
        }
    }

    Ok((line_count, meta))
}

/// Gemini `logs.json`: a message array, or an object holding one.
fn read_json_document(path: &Path) -> Result<Option<(usize, HeadMetadata)>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    let text = String::from_utf8_lossy(&bytes);

    let document: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Undecodable JSON session");
            return Ok(None);
        }
    };

    let mut meta = HeadMetadata::default();
    let count = match &document {
        Value::Object(map) => {
            meta.session_id = str_field(map, "sessionId");
            map.get("messages")
                .or_else(|| map.get("history"))
                .and_then(Value::as_array)
                .map_or(0, Vec::len)
        }
        Value::Array(items) => items.len(),
        _ => 0,
    };

    Ok(Some((count, meta)))
}

fn claude_metadata(record: &Map<String, Value>, meta: &mut HeadMetadata) {
    // Last seen wins
    if let Some(id) = str_field(record, "sessionId") {
        meta.session_id = Some(id);
    }
    if meta.slug.is_empty() {
        meta.slug = str_field(record, "slug").unwrap_or_default();
    }
    if meta.branch.is_empty() {
        meta.branch = str_field(record, "gitBranch").unwrap_or_default();
    }
    if record.get("type").and_then(Value::as_str) == Some("assistant") {
        let usage = record.get("message").and_then(|m| m.get("usage"));
        meta.input_tokens = meta.input_tokens.saturating_add(u64_at(usage, "input_tokens"));
        meta.output_tokens = meta.output_tokens.saturating_add(u64_at(usage, "output_tokens"));
        meta.cache_tokens = meta
            .cache_tokens
            .saturating_add(u64_at(usage, "cache_read_input_tokens"));
    }
}

fn codex_metadata(record: &Map<String, Value>, meta: &mut HeadMetadata) {
    match record.get("type").and_then(Value::as_str) {
        Some("session_meta") => {
            let payload_id = record
                .get("payload")
                .and_then(|p| p.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(id) = payload_id.or_else(|| str_field(record, "session_id")) {
                meta.session_id = Some(id);
            }
        }
        Some("event_msg") => {
            let payload = record.get("payload").or_else(|| record.get("msg"));
            if payload.and_then(|p| p.get("type")).and_then(Value::as_str) == Some("token_count") {
                let usage = payload
                    .and_then(|p| p.get("info"))
                    .and_then(|i| i.get("last_token_usage"));
                meta.input_tokens = meta.input_tokens.saturating_add(u64_at(usage, "input_tokens"));
                meta.output_tokens = meta
                    .output_tokens
                    .saturating_add(u64_at(usage, "output_tokens"));
            }
        }
        _ => {}
    }
}

fn gemini_metadata(record: &Map<String, Value>, meta: &mut HeadMetadata) {
    match record.get("type").and_then(Value::as_str) {
        Some("session_metadata") => {
            if let Some(id) = str_field(record, "sessionId") {
                meta.session_id = Some(id);
            }
        }
        Some("message_update") => {
            let tokens = record.get("tokens");
            meta.input_tokens = meta.input_tokens.saturating_add(u64_at(tokens, "input"));
            meta.output_tokens = meta.output_tokens.saturating_add(u64_at(tokens, "output"));
        }
        _ => {}
    }
}

fn str_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn u64_at(parent: Option<&Value>, key: &str) -> u64 {
    parent
        .and_then(|p| p.get(key))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn summarize(path: &Path, source: Source) -> SessionSummary {
        build_summary(path, source, SystemTime::now(), &SummaryLimits::default())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_claude_summary() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("-Users-me-myproj");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("abc.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"type\":\"file-history-snapshot\"}\n",
                "\n",
                "{\"type\":\"user\",\"sessionId\":\"s-1\",\"slug\":\"calm-fox\",\"gitBranch\":\"dev\"}\n",
                "{\"type\":\"assistant\",\"sessionId\":\"s-1\",\"message\":{\"usage\":",
                "{\"input_tokens\":7,\"output_tokens\":3,\"cache_read_input_tokens\":2}}}\n",
                "not json\n",
            ),
        )
        .unwrap();
        fs::create_dir_all(dir.join("s-1/subagents")).unwrap();
        fs::write(dir.join("s-1/subagents/agent-a.jsonl"), "{}\n").unwrap();

        let summary = summarize(&path, Source::Claude);
        assert_eq!(summary.id, "s-1");
        assert_eq!(summary.project_name, "-Users-me-myproj");
        assert_eq!(summary.event_count, 4);
        assert_eq!(summary.agent_count, 2);
        assert_eq!(summary.slug, "calm-fox");
        assert_eq!(summary.branch, "dev");
        assert_eq!(summary.total_input_tokens, 7);
        assert_eq!(summary.total_output_tokens, 3);
        assert_eq!(summary.total_cache_tokens, 2);
        assert!(summary.is_active);
    }

    #[test]
    fn test_huge_token_counts_saturate() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("proj/big.jsonl");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let record = serde_json::json!({
            "type": "assistant",
            "sessionId": "big",
            "message": {"usage": {"input_tokens": u64::MAX}}
        });
        let line = format!("{}\n", record);
        fs::write(&path, line.repeat(2)).unwrap();

        let summary = summarize(&path, Source::Claude);
        assert_eq!(summary.total_input_tokens, u64::MAX);
        assert_eq!(summary.event_count, 2);
    }

    #[test]
    fn test_metadata_window_is_bounded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("late.jsonl");
        let mut content = String::new();
        for _ in 0..3 {
            content.push_str("{\"type\":\"progress\"}\n");
        }
        content.push_str("{\"type\":\"user\",\"sessionId\":\"late\",\"slug\":\"too-late\"}\n");
        fs::write(&path, content).unwrap();

        let limits = SummaryLimits {
            metadata_line_limit: 3,
            ..Default::default()
        };
        let summary = build_summary(&path, Source::Claude, SystemTime::now(), &limits)
            .unwrap()
            .unwrap();
        assert_eq!(summary.id, "late");
        assert_eq!(summary.slug, "");
        assert_eq!(summary.event_count, 4);
    }

    #[test]
    fn test_codex_summary() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("sessions");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rollout-2025-01-01T00-00-00-abcdef.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"type\":\"session_meta\",\"payload\":{\"id\":\"codex-1\"}}\n",
                "{\"type\":\"event_msg\",\"payload\":{\"type\":\"token_count\",",
                "\"info\":{\"last_token_usage\":{\"input_tokens\":11,\"output_tokens\":4}}}}\n",
            ),
        )
        .unwrap();

        let summary = summarize(&path, Source::Codex);
        assert_eq!(summary.id, "codex-1");
        assert_eq!(summary.source, Source::Codex);
        assert_eq!(summary.project_name, "rollout-2025-01-01T0");
        assert_eq!(summary.total_input_tokens, 11);
        assert_eq!(summary.total_output_tokens, 4);
        assert_eq!(summary.agent_count, 1);
    }

    #[test]
    fn test_gemini_jsonl_summary() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("hash123");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session-1.jsonl");
        fs::write(
            &path,
            concat!(
                "{\"type\":\"session_metadata\",\"sessionId\":\"g-1\"}\n",
                "{\"type\":\"message_update\",\"tokens\":{\"input\":5,\"output\":6}}\n",
            ),
        )
        .unwrap();

        let summary = summarize(&path, Source::Gemini);
        assert_eq!(summary.id, "g-1");
        assert_eq!(summary.project_name, "hash123");
        assert_eq!(summary.total_input_tokens, 5);
        assert_eq!(summary.total_output_tokens, 6);
    }

    #[test]
    fn test_gemini_logs_json() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("hash456");
        fs::create_dir_all(&dir).unwrap();

        let object = dir.join("logs.json");
        fs::write(&object, r#"{"sessionId": "g-2", "messages": [{}, {}, {}]}"#).unwrap();
        let summary = summarize(&object, Source::Gemini);
        assert_eq!(summary.id, "g-2");
        assert_eq!(summary.event_count, 3);

        fs::write(&object, r#"[{"a": 1}, {"b": 2}]"#).unwrap();
        let summary = summarize(&object, Source::Gemini);
        assert_eq!(summary.id, "logs");
        assert_eq!(summary.event_count, 2);

        fs::write(&object, "{ not json").unwrap();
        let result =
            build_summary(&object, Source::Gemini, SystemTime::now(), &SummaryLimits::default())
                .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_inactive_when_old() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("old.jsonl");
        fs::write(&path, "{}\n").unwrap();

        let later = SystemTime::now() + Duration::from_secs(3600);
        let summary = build_summary(&path, Source::Claude, later, &SummaryLimits::default())
            .unwrap()
            .unwrap();
        assert!(!summary.is_active);
    }

    #[test]
    fn test_project_name_rules() {
        assert_eq!(project_name(Path::new("/x/projects/abcdef.jsonl"), 3), "abc");
        assert_eq!(project_name(Path::new("/x/tmp/短い名前のファイル.jsonl"), 2), "短い");
        assert_eq!(project_name(Path::new("/x/my-app/s.jsonl"), 3), "my-app");
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = build_summary(
            Path::new("/nonexistent/x.jsonl"),
            Source::Claude,
            SystemTime::now(),
            &SummaryLimits::default(),
        );
        assert!(result.is_err());
    }
}
