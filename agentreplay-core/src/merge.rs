//! Merged feed across sessions
//!
//! Combines the most recent session of each project into one time-ordered
//! stream. Every event and agent is tagged with its project; agents are
//! keyed `"<project>:<agent id>"` and named `"<project>/<name>"` so ids from
//! different sessions never collide.

use crate::config::{MergeConfig, TailConfig};
use crate::error::Result;
use crate::ingest::SessionAssembler;
use crate::scan::DirectoryScanner;
use crate::tail::{compute_delta, run_tail, DeltaOutcome, TailOptions, TailSource};
use crate::types::{Agent, Event, Session, SessionSummary};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// An event tagged with the project it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectEvent {
    pub project: String,
    #[serde(flatten)]
    pub event: Event,
}

/// An agent re-keyed for the merged feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectAgent {
    pub project: String,
    #[serde(flatten)]
    pub agent: Agent,
}

/// Merged agents keyed by `"<project>:<agent id>"`.
pub type ProjectAgents = BTreeMap<String, ProjectAgent>;

/// Everything the merged feed holds right now.
#[derive(Debug, Clone, Serialize)]
pub struct MergedSnapshot {
    /// Sorted by timestamp, at most `max_events`
    pub events: Vec<ProjectEvent>,
    pub agents: ProjectAgents,
    pub session_count: usize,
    pub sessions: Vec<SessionSummary>,
}

/// A session whose event list shrank; its earlier events are void.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRestart {
    pub project: String,
    pub file_path: String,
    /// The session's full current event list
    pub events: Vec<ProjectEvent>,
}

/// Changes across all active sessions since the last poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedDelta {
    /// Events appended since the last poll, sorted by timestamp
    pub events: Vec<ProjectEvent>,
    /// Sessions to replace wholesale; never duplicated in `events`
    pub restarts: Vec<SessionRestart>,
    pub agents: ProjectAgents,
    pub active_count: usize,
}

/// Pick the first (most recent) summary of each project, up to `max`.
///
/// Expects `summaries` in scanner order.
pub fn recent_per_project(summaries: &[SessionSummary], max: usize) -> Vec<SessionSummary> {
    let mut seen = HashSet::new();
    summaries
        .iter()
        .filter(|s| seen.insert(s.project_name.clone()))
        .take(max)
        .cloned()
        .collect()
}

/// Add a session's agents to `agents` under project-scoped keys.
pub fn add_project_agents(project: &str, session: &Session, agents: &mut ProjectAgents) {
    for agent in &session.agents {
        let key = format!("{}:{}", project, agent.id);
        let mut renamed = agent.clone();
        renamed.id = key.clone();
        renamed.name = format!("{}/{}", project, agent.name);
        agents.insert(
            key,
            ProjectAgent {
                project: project.to_string(),
                agent: renamed,
            },
        );
    }
}

fn tag_events<'a>(project: &str, events: &'a [Event]) -> impl Iterator<Item = ProjectEvent> + 'a {
    let project = project.to_string();
    events.iter().map(move |event| ProjectEvent {
        project: project.clone(),
        event: event.clone(),
    })
}

fn sort_events(events: &mut [ProjectEvent]) {
    events.sort_by(|a, b| a.event.timestamp.cmp(&b.event.timestamp));
}

/// Build the merged view of the most recent session per project.
///
/// Sessions that fail to assemble are logged and left out.
pub fn merged_snapshot(
    scanner: &DirectoryScanner,
    assembler: &SessionAssembler,
    config: &MergeConfig,
) -> Result<MergedSnapshot> {
    let summaries = scanner.scan()?;
    let selected = recent_per_project(&summaries, config.max_sessions);

    let mut events = Vec::new();
    let mut agents = ProjectAgents::new();

    for summary in &selected {
        let project = summary.project_name.as_str();
        let session = match assembler.assemble(Path::new(&summary.file_path)) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    project = %project,
                    path = %summary.file_path,
                    error = %e,
                    "Failed to assemble session for merged feed"
                );
                continue;
            }
        };
        events.extend(tag_events(project, &session.events));
        add_project_agents(project, &session, &mut agents);
    }

    sort_events(&mut events);
    if events.len() > config.max_events {
        events.drain(..events.len() - config.max_events);
    }

    Ok(MergedSnapshot {
        events,
        agents,
        session_count: selected.len(),
        sessions: selected,
    })
}

/// Incremental merged feed over the currently active sessions.
#[derive(Debug)]
pub struct MergedTail {
    scanner: Arc<DirectoryScanner>,
    assembler: Arc<SessionAssembler>,
    initial_tail: usize,
    /// Event count last sent, per file path
    seen: HashMap<String, usize>,
}

impl MergedTail {
    pub fn new(
        scanner: Arc<DirectoryScanner>,
        assembler: Arc<SessionAssembler>,
        initial_tail: usize,
    ) -> Self {
        Self {
            scanner,
            assembler,
            initial_tail,
            seen: HashMap::new(),
        }
    }

    /// Number of files with a remembered event count.
    pub fn tracked_files(&self) -> usize {
        self.seen.len()
    }

    /// Rescan and collect events not yet sent.
    ///
    /// A session seen for the first time contributes its last `initial_tail`
    /// events; a session that shrank is reported in `restarts`. Counts for
    /// files that no longer appear in the scan are forgotten.
    pub fn poll(&mut self) -> Result<Option<MergedDelta>> {
        let summaries = self.scanner.scan()?;
        let listed: HashSet<&str> = summaries.iter().map(|s| s.file_path.as_str()).collect();
        self.seen.retain(|path, _| listed.contains(path.as_str()));

        let active: Vec<&SessionSummary> = summaries.iter().filter(|s| s.is_active).collect();

        let mut events = Vec::new();
        let mut restarts = Vec::new();
        let mut agents = ProjectAgents::new();

        for summary in &active {
            let session = match self.assembler.assemble(Path::new(&summary.file_path)) {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(
                        path = %summary.file_path,
                        error = %e,
                        "Failed to assemble active session"
                    );
                    continue;
                }
            };

            let project = summary.project_name.as_str();
            let previous = self.seen.get(&summary.file_path).copied();
            match compute_delta(previous, session.event_count(), self.initial_tail) {
                DeltaOutcome::Append { start } => {
                    events.extend(tag_events(project, &session.events[start..]));
                }
                DeltaOutcome::Restart => {
                    tracing::info!(
                        project = %project,
                        path = %summary.file_path,
                        "Session shrank, restarting in merged feed"
                    );
                    restarts.push(SessionRestart {
                        project: project.to_string(),
                        file_path: summary.file_path.clone(),
                        events: tag_events(project, &session.events).collect(),
                    });
                }
            }
            self.seen.insert(summary.file_path.clone(), session.event_count());
            add_project_agents(project, &session, &mut agents);
        }

        if events.is_empty() && restarts.is_empty() {
            return Ok(None);
        }
        sort_events(&mut events);

        Ok(Some(MergedDelta {
            events,
            restarts,
            agents,
            active_count: active.len(),
        }))
    }
}

impl TailSource for MergedTail {
    type Update = MergedDelta;

    fn poll(&mut self) -> Result<Option<MergedDelta>> {
        MergedTail::poll(self)
    }
}

/// Run the merged feed with the configured merged interval.
pub fn run_merged_tail(
    tail: MergedTail,
    config: &TailConfig,
    updates: mpsc::Sender<MergedDelta>,
    shutdown: watch::Receiver<bool>,
) -> impl Future<Output = ()> + Send + 'static {
    tracing::info!("Starting merged tail");
    run_tail(tail, TailOptions::merged(config), updates, shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScannerConfig;
    use crate::types::Source;
    use chrono::Utc;
    use serde_json::json;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn user_line(session: &str, ts: &str, text: &str) -> String {
        json!({"type": "user", "sessionId": session, "timestamp": ts,
               "message": {"content": text}})
        .to_string()
    }

    fn write_session(path: &Path, lines: &[String]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = fs::File::create(path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
    }

    fn event_contents(events: &[ProjectEvent]) -> Vec<&str> {
        events.iter().map(|e| e.event.content.as_str()).collect()
    }

    fn append(path: &Path, line: &str) {
        let mut file = fs::OpenOptions::new().append(true).open(path).unwrap();
        writeln!(file, "{}", line).unwrap();
    }

    fn summary(id: &str, project: &str) -> SessionSummary {
        SessionSummary {
            id: id.to_string(),
            project_name: project.to_string(),
            file_path: format!("/{}/{}.jsonl", project, id),
            event_count: 0,
            agent_count: 1,
            is_active: false,
            last_modified: Utc::now(),
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cache_tokens: 0,
            slug: String::new(),
            branch: String::new(),
            source: Source::Claude,
        }
    }

    #[test]
    fn test_recent_per_project() {
        let summaries = vec![
            summary("a1", "alpha"),
            summary("b1", "beta"),
            summary("a2", "alpha"),
            summary("c1", "gamma"),
        ];
        let ids: Vec<String> = recent_per_project(&summaries, 10)
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a1", "b1", "c1"]);
        assert_eq!(recent_per_project(&summaries, 2).len(), 2);
    }

    #[test]
    fn test_project_agent_keys() {
        let session = Session::new("s");
        let mut agents = ProjectAgents::new();
        add_project_agents("alpha", &session, &mut agents);

        let main = agents.get("alpha:main").unwrap();
        assert_eq!(main.project, "alpha");
        assert_eq!(main.agent.id, "alpha:main");
        assert_eq!(main.agent.name, "alpha/Main");

        let doc = serde_json::to_value(main).unwrap();
        assert_eq!(doc["project"], "alpha");
        assert_eq!(doc["name"], "alpha/Main");
    }

    #[test]
    fn test_merged_snapshot_interleaves_projects() {
        let temp = TempDir::new().unwrap();
        write_session(
            &temp.path().join("alpha/a.jsonl"),
            &[
                user_line("a", "2025-01-01T00:00:01Z", "a1"),
                user_line("a", "2025-01-01T00:00:03Z", "a2"),
            ],
        );
        write_session(
            &temp.path().join("beta/b.jsonl"),
            &[user_line("b", "2025-01-01T00:00:02Z", "b1")],
        );

        let scanner = DirectoryScanner::pinned(temp.path(), &ScannerConfig::default());
        let assembler = SessionAssembler::default();
        let snapshot = merged_snapshot(&scanner, &assembler, &MergeConfig::default()).unwrap();

        let contents = event_contents(&snapshot.events);
        assert_eq!(contents, vec!["a1", "b1", "a2"]);
        assert_eq!(snapshot.events[1].project, "beta");
        assert_eq!(snapshot.session_count, 2);
        assert!(snapshot.agents.contains_key("alpha:main"));
        assert!(snapshot.agents.contains_key("beta:main"));

        let doc = serde_json::to_value(&snapshot.events[0]).unwrap();
        assert_eq!(doc["project"], "alpha");
        assert_eq!(doc["type"], "user");
    }

    #[test]
    fn test_merged_snapshot_keeps_latest_events() {
        let temp = TempDir::new().unwrap();
        let lines: Vec<String> = (0..5)
            .map(|i| user_line("a", &format!("2025-01-01T00:00:0{}Z", i), &format!("m{}", i)))
            .collect();
        write_session(&temp.path().join("alpha/a.jsonl"), &lines);

        let scanner = DirectoryScanner::pinned(temp.path(), &ScannerConfig::default());
        let config = MergeConfig {
            max_events: 2,
            ..Default::default()
        };
        let snapshot = merged_snapshot(&scanner, &SessionAssembler::default(), &config).unwrap();
        assert_eq!(event_contents(&snapshot.events), vec!["m3", "m4"]);
    }

    #[test]
    fn test_merged_tail_sends_only_new_events() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("alpha/a.jsonl");
        let lines: Vec<String> = (0..4)
            .map(|i| user_line("a", &format!("2025-01-01T00:00:0{}Z", i), &format!("m{}", i)))
            .collect();
        write_session(&path, &lines);

        let config = ScannerConfig {
            cache_ttl_secs: 0,
            ..Default::default()
        };
        let scanner = Arc::new(DirectoryScanner::pinned(temp.path(), &config));
        let mut tail = MergedTail::new(scanner, Arc::new(SessionAssembler::default()), 2);

        let first = tail.poll().unwrap().unwrap();
        assert_eq!(event_contents(&first.events), vec!["m2", "m3"]);
        assert!(first.restarts.is_empty());
        assert_eq!(first.active_count, 1);

        assert!(tail.poll().unwrap().is_none());

        append(&path, &user_line("a", "2025-01-01T00:00:09Z", "m9"));
        let next = tail.poll().unwrap().unwrap();
        assert_eq!(next.events.len(), 1);
        assert_eq!(next.events[0].event.content, "m9");
    }

    #[test]
    fn test_merged_tail_reports_shrunk_session_as_restart() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("alpha/a.jsonl");
        let lines: Vec<String> = (0..3)
            .map(|i| user_line("a", &format!("2025-01-01T00:00:0{}Z", i), &format!("m{}", i)))
            .collect();
        write_session(&path, &lines);

        let config = ScannerConfig {
            cache_ttl_secs: 0,
            ..Default::default()
        };
        let scanner = Arc::new(DirectoryScanner::pinned(temp.path(), &config));
        let mut tail = MergedTail::new(scanner, Arc::new(SessionAssembler::default()), 10);
        assert_eq!(tail.poll().unwrap().unwrap().events.len(), 3);

        write_session(&path, &[user_line("a", "2025-01-01T00:00:05Z", "fresh")]);
        let update = tail.poll().unwrap().unwrap();
        assert!(update.events.is_empty());
        assert_eq!(update.restarts.len(), 1);
        assert_eq!(update.restarts[0].project, "alpha");
        assert_eq!(event_contents(&update.restarts[0].events), vec!["fresh"]);

        append(&path, &user_line("a", "2025-01-01T00:00:06Z", "next"));
        let next = tail.poll().unwrap().unwrap();
        assert!(next.restarts.is_empty());
        assert_eq!(event_contents(&next.events), vec!["next"]);
    }

    #[test]
    fn test_merged_tail_forgets_removed_files() {
        let temp = TempDir::new().unwrap();
        let keep = temp.path().join("alpha/a.jsonl");
        let gone = temp.path().join("beta/b.jsonl");
        write_session(&keep, &[user_line("a", "2025-01-01T00:00:01Z", "a1")]);
        write_session(&gone, &[user_line("b", "2025-01-01T00:00:02Z", "b1")]);

        let config = ScannerConfig {
            cache_ttl_secs: 0,
            ..Default::default()
        };
        let scanner = Arc::new(DirectoryScanner::pinned(temp.path(), &config));
        let mut tail = MergedTail::new(scanner, Arc::new(SessionAssembler::default()), 10);
        tail.poll().unwrap();
        assert_eq!(tail.tracked_files(), 2);

        fs::remove_file(&gone).unwrap();
        assert!(tail.poll().unwrap().is_none());
        assert_eq!(tail.tracked_files(), 1);
    }
}
