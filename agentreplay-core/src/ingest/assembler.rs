//! Session assembly
//!
//! Turns one main transcript plus its sub-agent logs into a single
//! [`Session`] whose events are ordered by timestamp.

use super::detect::{detect_file, DEFAULT_DETECT_LINE_LIMIT};
use super::parser::{ParsedStream, StreamOwner, TranscriptParser};
use super::parsers::parser_for;
use super::subagents;
use crate::config::AssemblerConfig;
use crate::error::Result;
use crate::types::{Agent, Session, AGENT_COLORS};
use std::path::Path;

/// Builds sessions from transcript files.
///
/// Holds no mutable state; one assembler can be shared across threads and
/// reused for any number of files.
#[derive(Debug, Clone)]
pub struct SessionAssembler {
    detect_line_limit: usize,
}

impl Default for SessionAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_DETECT_LINE_LIMIT)
    }
}

impl SessionAssembler {
    pub fn new(detect_line_limit: usize) -> Self {
        Self { detect_line_limit }
    }

    pub fn from_config(config: &AssemblerConfig) -> Self {
        Self::new(config.detect_line_limit)
    }

    /// Assemble the session stored at `path`.
    ///
    /// Fails when the main file cannot be read or its format has no parser.
    /// Unreadable sub-agent logs are skipped.
    pub fn assemble(&self, path: &Path) -> Result<Session> {
        let format = detect_file(path, self.detect_line_limit)?;
        let parser = parser_for(format);

        let main = parser.parse_stream(path, &StreamOwner::Main)?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let lookup_id = main
            .metadata
            .first_session_id
            .clone()
            .unwrap_or_else(|| stem.clone());

        let mut session = Session::new(stem);
        let mut streams = Vec::new();
        let mut color_index = 0usize;

        for file in subagents::discover(path, &lookup_id) {
            let Some(stream) = parse_subagent(parser.as_ref(), &file) else {
                continue;
            };

            if session.agents.contains(&stream.agent_id) {
                tracing::debug!(
                    path = %file.display(),
                    agent_id = %stream.agent_id,
                    "Sub-agent id already registered, folding streams"
                );
            } else {
                let color = AGENT_COLORS[color_index % AGENT_COLORS.len()];
                color_index += 1;
                session.agents.insert(Agent::subagent(stream.agent_id.clone(), color));
            }
            streams.push(stream);
        }

        apply_metadata(&mut session, &main);

        let mut events = Vec::new();
        for stream in std::iter::once(main).chain(streams) {
            if let Some(agent) = session.agents.get_mut(&stream.agent_id) {
                agent.add_tokens(stream.usage);
            }
            events.extend(stream.events);
        }

        // Stable: equal timestamps keep main-then-sub-agent discovery order
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        for event in &events {
            if let Some(agent) = session.agents.get_mut(&event.agent_id) {
                if agent.spawn_time.is_empty() {
                    agent.spawn_time = event.timestamp.clone();
                }
            }
        }
        session.events = events;

        tracing::debug!(
            path = %path.display(),
            session_id = %session.id,
            agents = session.agents.len(),
            events = session.event_count(),
            "Assembled session"
        );

        Ok(session)
    }
}

/// Parse one sub-agent log; `None` when it is unreadable or empty.
fn parse_subagent(parser: &dyn TranscriptParser, path: &Path) -> Option<ParsedStream> {
    let owner = StreamOwner::SubAgent {
        fallback_id: subagents::fallback_agent_id(path),
    };
    match parser.parse_stream(path, &owner) {
        Ok(stream) if stream.record_count == 0 => {
            tracing::debug!(path = %path.display(), "Empty sub-agent log, skipping");
            None
        }
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read sub-agent log");
            None
        }
    }
}

fn apply_metadata(session: &mut Session, main: &ParsedStream) {
    match &main.metadata.session {
        Some(meta) => {
            session.id = meta.session_id.clone();
            session.slug = meta.slug.clone();
            session.version = meta.version.clone();
            session.branch = meta.branch.clone();
            session.start_time = meta.start_time.clone();
        }
        None => {
            if let Some(id) = &main.metadata.first_session_id {
                session.id = id.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{EventType, TokenTotals};
    use serde_json::{json, Value};
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_jsonl(path: &Path, lines: &[Value]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = fs::File::create(path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
    }

    fn main_log(dir: &Path) -> PathBuf {
        let path = dir.join("sess-1.jsonl");
        write_jsonl(
            &path,
            &[
                json!({"type": "user", "sessionId": "sess-1", "slug": "brave-otter",
                       "version": "2.1.0", "gitBranch": "main",
                       "timestamp": "2025-01-01T00:00:00Z", "message": {"content": "start"}}),
                json!({"type": "assistant", "sessionId": "sess-1", "requestId": "r1",
                       "timestamp": "2025-01-01T00:00:05Z",
                       "message": {"content": [{"type": "tool_use", "name": "Task",
                                                "input": {"description": "explore"}}],
                                   "usage": {"input_tokens": 10, "output_tokens": 2}}}),
            ],
        );
        path
    }

    #[test]
    fn test_assemble_main_only() {
        let temp = TempDir::new().unwrap();
        let path = main_log(temp.path());

        let session = SessionAssembler::default().assemble(&path).unwrap();
        assert_eq!(session.id, "sess-1");
        assert_eq!(session.slug, "brave-otter");
        assert_eq!(session.version, "2.1.0");
        assert_eq!(session.branch, "main");
        assert_eq!(session.start_time, "2025-01-01T00:00:00Z");
        assert_eq!(session.agents.len(), 1);
        assert_eq!(session.event_count(), 2);

        let main = session.main_agent().unwrap();
        assert_eq!(main.tokens(), TokenTotals::new(10, 2, 0));
        assert_eq!(main.spawn_time, "2025-01-01T00:00:00Z");
    }

    #[test]
    fn test_subagents_are_merged_in_time_order() {
        let temp = TempDir::new().unwrap();
        let path = main_log(temp.path());
        let sub_dir = temp.path().join("sess-1/subagents");
        write_jsonl(
            &sub_dir.join("agent-aaaa1111.jsonl"),
            &[json!({"type": "assistant", "agentId": "aaaa1111bbbb", "requestId": "s1",
                     "timestamp": "2025-01-01T00:00:02Z",
                     "message": {"content": [{"type": "text", "text": "sub says hi"}],
                                 "usage": {"input_tokens": 4, "output_tokens": 1}}})],
        );
        write_jsonl(&sub_dir.join("agent-empty.jsonl"), &[]);
        write_jsonl(
            &sub_dir.join("agent-zzzz.jsonl"),
            &[json!({"type": "user", "timestamp": "2025-01-01T00:00:09Z",
                     "message": {"content": "second sub"}})],
        );

        let session = SessionAssembler::default().assemble(&path).unwrap();

        let ids: Vec<&str> = session.agents.ids().collect();
        assert_eq!(ids, vec!["main", "aaaa1111bbbb", "zzzz"]);

        let first = session.agents.get("aaaa1111bbbb").unwrap();
        assert!(first.is_subagent);
        assert_eq!(first.name, "aaaa111");
        assert_eq!(first.color, "cyan");
        assert_eq!(first.tokens(), TokenTotals::new(4, 1, 0));
        assert_eq!(first.spawn_time, "2025-01-01T00:00:02Z");
        // empty log consumed no colour
        assert_eq!(session.agents.get("zzzz").unwrap().color, "magenta");

        let order: Vec<&str> = session.events.iter().map(|e| e.agent_id.as_str()).collect();
        assert_eq!(order, vec!["main", "aaaa1111bbbb", "main", "zzzz"]);
        assert!(session
            .events
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_equal_timestamps_keep_discovery_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tie.jsonl");
        write_jsonl(
            &path,
            &[json!({"type": "user", "sessionId": "tie", "timestamp": "T",
                     "message": {"content": "from main"}})],
        );
        write_jsonl(
            &temp.path().join("tie/subagents/agent-s.jsonl"),
            &[json!({"type": "user", "timestamp": "T", "message": {"content": "from sub"}})],
        );

        let session = SessionAssembler::default().assemble(&path).unwrap();
        assert_eq!(session.events[0].content, "from main");
        assert_eq!(session.events[1].content, "from sub");
    }

    #[test]
    fn test_session_id_falls_back_to_stem() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("no-meta.jsonl");
        write_jsonl(&path, &[json!({"type": "file-history-snapshot", "messageId": "m"})]);

        let session = SessionAssembler::default().assemble(&path).unwrap();
        assert_eq!(session.id, "no-meta");
        assert!(session.events.is_empty());
        assert_eq!(session.agents.len(), 1);
    }

    #[test]
    fn test_unsupported_format_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rollout.jsonl");
        write_jsonl(&path, &[json!({"type": "session_meta", "payload": {"id": "c"}})]);

        let err = SessionAssembler::default().assemble(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_missing_file_fails() {
        let err = SessionAssembler::default()
            .assemble(Path::new("/nonexistent/session.jsonl"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_spawn_event_type_survives_assembly() {
        let temp = TempDir::new().unwrap();
        let path = main_log(temp.path());
        let session = SessionAssembler::default().assemble(&path).unwrap();
        assert_eq!(session.events[1].event_type, EventType::Spawn);
        assert_eq!(session.events[1].tokens(), TokenTotals::new(10, 2, 0));
    }
}
