//! Core domain types for agentreplay
//!
//! These types are the normalized model that every supported agent tool's
//! transcript is converted into.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One coding-agent run, including the merged events of all its sub-agents |
//! | **Agent** | One logical actor: the main session (`"main"`) or a spawned sub-agent |
//! | **Event** | One atomic, ordered occurrence attributed to exactly one agent |
//! | **Source** | The agent tool that produced a log (Claude Code, Codex, Gemini) |
//! | **Transcript format** | The on-disk record shape, as classified by the detector |
//! | **Request id** | Opaque id grouping everything one model turn produced |

use crate::format::{short_path, summarize};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Palette assigned round-robin to sub-agents in discovery order.
pub const AGENT_COLORS: [&str; 6] = ["cyan", "magenta", "yellow", "green", "red", "blue"];

/// Id of the one non-sub-agent actor in every session.
pub const MAIN_AGENT_ID: &str = "main";

// ============================================
// Formats and sources
// ============================================

/// Closed set of transcript formats the detector can classify a file into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptFormat {
    /// Claude Code session logs (`user`/`assistant` records with `sessionId`)
    ClaudeCode,
    /// OpenAI Codex CLI rollouts; also the last-resort default
    Codex,
    /// Gemini CLI session logs
    Gemini,
}

impl TranscriptFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptFormat::ClaudeCode => "claude_code",
            TranscriptFormat::Codex => "codex",
            TranscriptFormat::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for TranscriptFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which agent tool produced a session log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Claude Code; also the fixed label for a pinned data directory
    #[default]
    Claude,
    Codex,
    Gemini,
}

impl Source {
    /// Returns the identifier used in cache keys and output documents
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Claude => "claude",
            Source::Codex => "codex",
            Source::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" | "claude_code" => Ok(Source::Claude),
            "codex" => Ok(Source::Codex),
            "gemini" => Ok(Source::Gemini),
            _ => Err(format!("unknown source: {}", s)),
        }
    }
}

// ============================================
// Events
// ============================================

/// Kind of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Spawn,
    Think,
    ToolCall,
    ToolResult,
    FileCreate,
    FileUpdate,
    FileRead,
    Bash,
    WebSearch,
    Text,
    Error,
    Complete,
    User,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Spawn => "spawn",
            EventType::Think => "think",
            EventType::ToolCall => "tool_call",
            EventType::ToolResult => "tool_result",
            EventType::FileCreate => "file_create",
            EventType::FileUpdate => "file_update",
            EventType::FileRead => "file_read",
            EventType::Bash => "bash",
            EventType::WebSearch => "web_search",
            EventType::Text => "text",
            EventType::Error => "error",
            EventType::Complete => "complete",
            EventType::User => "user",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spawn" => Ok(EventType::Spawn),
            "think" => Ok(EventType::Think),
            "tool_call" => Ok(EventType::ToolCall),
            "tool_result" => Ok(EventType::ToolResult),
            "file_create" => Ok(EventType::FileCreate),
            "file_update" => Ok(EventType::FileUpdate),
            "file_read" => Ok(EventType::FileRead),
            "bash" => Ok(EventType::Bash),
            "web_search" => Ok(EventType::WebSearch),
            "text" => Ok(EventType::Text),
            "error" => Ok(EventType::Error),
            "complete" => Ok(EventType::Complete),
            "user" => Ok(EventType::User),
            _ => Err(format!("unknown event type: {}", s)),
        }
    }
}

/// Token counts for one request, one event or one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
}

impl TokenTotals {
    pub fn new(input: u64, output: u64, cache_read: u64) -> Self {
        Self {
            input,
            output,
            cache_read,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.input == 0 && self.output == 0 && self.cache_read == 0
    }

    /// Add `other`, saturating at `u64::MAX`.
    pub fn add(&mut self, other: TokenTotals) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
        self.cache_read = self.cache_read.saturating_add(other.cache_read);
    }
}

/// One atomic, ordered occurrence in a session.
///
/// Empty strings stand for absent optional fields. The serialized document
/// also carries the derived `short_path` and `summary` display fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Event {
    /// ISO-8601 timestamp; sorts lexically
    pub timestamp: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Owning agent, always a key of [`Session::agents`]
    pub agent_id: String,
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
}

impl Event {
    pub fn new(
        timestamp: impl Into<String>,
        event_type: EventType,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            event_type,
            agent_id: agent_id.into(),
            tool_name: String::new(),
            file_path: String::new(),
            content: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>, file_path: impl Into<String>) -> Self {
        self.tool_name = tool_name.into();
        self.file_path = file_path.into();
        self
    }

    pub fn with_tokens(mut self, tokens: TokenTotals) -> Self {
        self.input_tokens = tokens.input;
        self.output_tokens = tokens.output;
        self.cache_read_tokens = tokens.cache_read;
        self
    }

    pub fn tokens(&self) -> TokenTotals {
        TokenTotals::new(self.input_tokens, self.output_tokens, self.cache_read_tokens)
    }

    /// One-line display summary of `content`
    pub fn summary(&self) -> String {
        summarize(&self.content)
    }

    /// Shortened `file_path` for display
    pub fn short_path(&self) -> String {
        short_path(&self.file_path)
    }
}

/// Wire shape of an [`Event`], including derived display fields.
#[derive(Serialize)]
struct EventDocument<'a> {
    timestamp: &'a str,
    #[serde(rename = "type")]
    event_type: EventType,
    agent_id: &'a str,
    tool_name: &'a str,
    file_path: &'a str,
    short_path: String,
    input_tokens: u64,
    output_tokens: u64,
    cache_read_tokens: u64,
    content: &'a str,
    summary: String,
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EventDocument {
            timestamp: &self.timestamp,
            event_type: self.event_type,
            agent_id: &self.agent_id,
            tool_name: &self.tool_name,
            file_path: &self.file_path,
            short_path: self.short_path(),
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_read_tokens: self.cache_read_tokens,
            content: &self.content,
            summary: self.summary(),
        }
        .serialize(serializer)
    }
}

// ============================================
// Agents
// ============================================

/// One logical actor in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique within the session
    pub id: String,
    /// Display label
    pub name: String,
    pub is_subagent: bool,
    /// Cosmetic palette tag, fixed at discovery time
    pub color: String,
    /// Timestamp of the agent's first event; set once
    pub spawn_time: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
}

impl Agent {
    /// The main agent every session starts with.
    pub fn main() -> Self {
        Self {
            id: MAIN_AGENT_ID.to_string(),
            name: "Main".to_string(),
            is_subagent: false,
            color: "white".to_string(),
            spawn_time: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
        }
    }

    /// A sub-agent; the display name is the first 7 characters of its id.
    pub fn subagent(id: impl Into<String>, color: impl Into<String>) -> Self {
        let id = id.into();
        let name = id.chars().take(7).collect();
        Self {
            id,
            name,
            is_subagent: true,
            color: color.into(),
            spawn_time: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
        }
    }

    pub fn tokens(&self) -> TokenTotals {
        TokenTotals::new(self.input_tokens, self.output_tokens, self.cache_read_tokens)
    }

    pub fn add_tokens(&mut self, tokens: TokenTotals) {
        self.input_tokens = self.input_tokens.saturating_add(tokens.input);
        self.output_tokens = self.output_tokens.saturating_add(tokens.output);
        self.cache_read_tokens = self.cache_read_tokens.saturating_add(tokens.cache_read);
    }
}

/// Agents keyed by id, iterated in discovery order.
///
/// Serializes as a JSON object whose keys appear in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentMap {
    agents: Vec<Agent>,
}

impl AgentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an agent. An existing agent with the same id is replaced in place,
    /// keeping its original position.
    pub fn insert(&mut self, agent: Agent) {
        match self.agents.iter_mut().find(|a| a.id == agent.id) {
            Some(existing) => *existing = agent,
            None => self.agents.push(agent),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|a| a.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Serialize for AgentMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.agents.len()))?;
        for agent in &self.agents {
            map.serialize_entry(&agent.id, agent)?;
        }
        map.end()
    }
}

impl<'a> IntoIterator for &'a AgentMap {
    type Item = &'a Agent;
    type IntoIter = std::slice::Iter<'a, Agent>;

    fn into_iter(self) -> Self::IntoIter {
        self.agents.iter()
    }
}

// ============================================
// Sessions
// ============================================

/// Aggregate root: one fully merged, time-ordered coding-agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: String,
    pub slug: String,
    pub version: String,
    pub branch: String,
    pub start_time: String,
    /// Discovery order: main first, then sub-agents
    pub agents: AgentMap,
    /// Sorted by timestamp ascending; ties keep discovery order
    pub events: Vec<Event>,
}

impl Session {
    /// An empty session holding only the main agent.
    pub fn new(id: impl Into<String>) -> Self {
        let mut agents = AgentMap::new();
        agents.insert(Agent::main());
        Self {
            id: id.into(),
            slug: String::new(),
            version: String::new(),
            branch: String::new(),
            start_time: String::new(),
            agents,
            events: Vec::new(),
        }
    }

    pub fn main_agent(&self) -> Option<&Agent> {
        self.agents.get(MAIN_AGENT_ID)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Serialize the session document.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parse-light projection of a session file used for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub project_name: String,
    pub file_path: String,
    /// Non-empty line count; an upper bound on the parsed event count
    pub event_count: usize,
    /// 1 + matched sub-agent files
    pub agent_count: usize,
    /// Modified within the freshness window
    pub is_active: bool,
    pub last_modified: DateTime<Utc>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cache_tokens: u64,
    pub slug: String,
    pub branch: String,
    pub source: Source,
}
