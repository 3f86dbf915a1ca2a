//! Claude Code JSONL parser
//!
//! Parses session logs from `~/.claude/projects/[encoded-path]/*.jsonl` and
//! the sub-agent logs stored beside them in `[session]/subagents/agent-*.jsonl`.
//!
//! # Record handling
//!
//! - **`user` records**: plain-text content becomes a `user` event; a block
//!   list yields one `tool_result` (or `error`) event per tool-result block.
//! - **`assistant` records**: content blocks are visited in order. `thinking`
//!   becomes `think`, non-blank `text` becomes `text`, and `tool_use` becomes
//!   the event type listed for the tool in [`TOOL_TABLE`].
//! - **Anything else** (summaries, snapshots, progress) yields no events.
//!
//! # Error Handling
//!
//! - **Malformed JSON lines / non-object lines**: skipped.
//! - **Wrong or missing fields**: decoded to defaults via [`lenient`], so a
//!   single bad field never drops the record.
//! - **Undecodable content blocks**: skipped one at a time.
//!
//! # Token accounting
//!
//! Two ledgers per stream, both keyed by `requestId`:
//! - agent usage is added the first time a request id is seen;
//! - event-level tokens go to the first `think` or `tool_use` event of a
//!   request, every later event of that request carries zeros.
//!
//! Records without a request id contribute no tokens.

use crate::error::Result;
use crate::ingest::lines::{parse_object, LossyLines};
use crate::ingest::parser::{
    lenient, ParsedStream, SessionMetadata, StreamOwner, TranscriptParser,
};
use crate::types::{Event, EventType, TokenTotals, TranscriptFormat};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Parser for Claude Code JSONL logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClaudeCodeParser;

impl ClaudeCodeParser {
    pub fn new() -> Self {
        Self
    }
}

// ============================================
// Tool table
// ============================================

/// How one tool's `tool_use` block maps onto an event.
#[derive(Debug)]
pub struct ToolSpec {
    pub name: &'static str,
    pub event_type: EventType,
    /// Input fields tried in order for the event content
    pub content_fields: &'static [&'static str],
    /// Tool targets a file named by `input.file_path`
    pub targets_file: bool,
}

/// Known tools. Unlisted tools become `tool_call` events whose content is
/// the compact JSON form of their input.
pub const TOOL_TABLE: &[ToolSpec] = &[
    ToolSpec {
        name: "Bash",
        event_type: EventType::Bash,
        content_fields: &["description", "command"],
        targets_file: false,
    },
    ToolSpec {
        name: "Read",
        event_type: EventType::FileRead,
        content_fields: &[],
        targets_file: true,
    },
    ToolSpec {
        name: "Write",
        event_type: EventType::FileCreate,
        content_fields: &[],
        targets_file: true,
    },
    ToolSpec {
        name: "Edit",
        event_type: EventType::FileUpdate,
        content_fields: &[],
        targets_file: true,
    },
    ToolSpec {
        name: "Glob",
        event_type: EventType::ToolCall,
        content_fields: &["pattern"],
        targets_file: false,
    },
    ToolSpec {
        name: "Grep",
        event_type: EventType::ToolCall,
        content_fields: &["pattern"],
        targets_file: false,
    },
    ToolSpec {
        name: "WebSearch",
        event_type: EventType::WebSearch,
        content_fields: &["query"],
        targets_file: false,
    },
    ToolSpec {
        name: "WebFetch",
        event_type: EventType::WebSearch,
        content_fields: &["url"],
        targets_file: false,
    },
    ToolSpec {
        name: "Task",
        event_type: EventType::Spawn,
        content_fields: &["description"],
        targets_file: false,
    },
];

/// Look up a tool by name.
pub fn tool_spec(name: &str) -> Option<&'static ToolSpec> {
    TOOL_TABLE.iter().find(|spec| spec.name == name)
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// Represents a single line from Claude Code JSONL.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    #[serde(rename = "type", deserialize_with = "lenient")]
    record_type: Option<String>,
    #[serde(deserialize_with = "lenient")]
    timestamp: Option<String>,
    #[serde(deserialize_with = "lenient")]
    session_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    slug: Option<String>,
    #[serde(deserialize_with = "lenient")]
    version: Option<String>,
    #[serde(deserialize_with = "lenient")]
    git_branch: Option<String>,
    #[serde(deserialize_with = "lenient")]
    agent_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    request_id: Option<String>,
    #[serde(deserialize_with = "lenient")]
    message: RawMessage,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    #[serde(deserialize_with = "lenient")]
    content: RawContent,
    #[serde(deserialize_with = "lenient")]
    usage: RawUsage,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<Value>),
}

impl Default for RawContent {
    fn default() -> Self {
        RawContent::Text(String::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default, deserialize_with = "lenient")]
        text: String,
    },
    Thinking {
        #[serde(default, deserialize_with = "lenient")]
        thinking: String,
    },
    ToolUse {
        #[serde(default, deserialize_with = "lenient")]
        name: Option<String>,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        content: Value,
        #[serde(default, deserialize_with = "lenient")]
        is_error: bool,
    },
    // Catch-all for unknown block types
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawUsage {
    #[serde(deserialize_with = "lenient")]
    input_tokens: u64,
    #[serde(deserialize_with = "lenient")]
    output_tokens: u64,
    #[serde(deserialize_with = "lenient")]
    cache_read_input_tokens: u64,
}

impl RawUsage {
    fn totals(&self) -> TokenTotals {
        TokenTotals::new(
            self.input_tokens,
            self.output_tokens,
            self.cache_read_input_tokens,
        )
    }
}

impl RawRecord {
    fn is_turn(&self) -> bool {
        matches!(self.record_type.as_deref(), Some("user") | Some("assistant"))
    }
}

// ============================================
// Parsing
// ============================================

impl TranscriptParser for ClaudeCodeParser {
    fn format(&self) -> TranscriptFormat {
        TranscriptFormat::ClaudeCode
    }

    fn parse_stream(&self, path: &Path, owner: &StreamOwner) -> Result<ParsedStream> {
        let records = read_records(path)?;

        let agent_id = match owner {
            StreamOwner::Main => owner.default_agent_id().to_string(),
            StreamOwner::SubAgent { fallback_id } => records
                .first()
                .and_then(|r| r.agent_id.clone())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| fallback_id.clone()),
        };

        let mut result = ParsedStream {
            agent_id,
            record_count: records.len(),
            ..Default::default()
        };

        result.metadata.first_session_id = records.iter().find_map(|r| r.session_id.clone());
        result.metadata.session = records
            .iter()
            .find(|r| r.is_turn() && r.session_id.is_some())
            .map(|r| SessionMetadata {
                session_id: r.session_id.clone().unwrap_or_default(),
                slug: r.slug.clone().unwrap_or_default(),
                version: r.version.clone().unwrap_or_default(),
                branch: r.git_branch.clone().unwrap_or_default(),
                start_time: r.timestamp.clone().unwrap_or_default(),
            });

        let mut stream = StreamProcessor::new(&result.agent_id);
        for record in &records {
            stream.process(record);
        }
        result.usage = stream.usage;
        result.events = stream.events;

        tracing::debug!(
            path = %path.display(),
            agent_id = %result.agent_id,
            records = result.record_count,
            events = result.events.len(),
            "Parsed Claude Code stream"
        );

        Ok(result)
    }
}

/// Read every decodable record of a JSONL file, in file order.
fn read_records(path: &Path) -> Result<Vec<RawRecord>> {
    let file = File::open(path)?;
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (index, line) in LossyLines::new(BufReader::new(file)).enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "Read error, stopping at last complete line"
                );
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let Some(object) = parse_object(&line) else {
            skipped += 1;
            continue;
        };
        match serde_json::from_value::<RawRecord>(Value::Object(object)) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                tracing::trace!(line = index + 1, error = %e, "Skipping undecodable record");
            }
        }
    }

    if skipped > 0 {
        tracing::debug!(path = %path.display(), skipped, "Skipped malformed lines");
    }

    Ok(records)
}

/// Converts the records of one stream into events for one agent.
struct StreamProcessor<'a> {
    agent_id: &'a str,
    /// Request ids already added to the agent's usage
    counted_requests: HashSet<String>,
    /// Request ids whose tokens already sit on an event
    attributed_requests: HashSet<String>,
    usage: TokenTotals,
    events: Vec<Event>,
}

impl<'a> StreamProcessor<'a> {
    fn new(agent_id: &'a str) -> Self {
        Self {
            agent_id,
            counted_requests: HashSet::new(),
            attributed_requests: HashSet::new(),
            usage: TokenTotals::default(),
            events: Vec::new(),
        }
    }

    fn process(&mut self, record: &RawRecord) {
        let timestamp = record.timestamp.as_deref().unwrap_or_default();
        match record.record_type.as_deref() {
            Some("user") => self.process_user(record, timestamp),
            Some("assistant") => self.process_assistant(record, timestamp),
            _ => {}
        }
    }

    fn process_user(&mut self, record: &RawRecord, timestamp: &str) {
        match &record.message.content {
            RawContent::Text(text) => {
                if !text.trim().is_empty() {
                    self.events.push(
                        Event::new(timestamp, EventType::User, self.agent_id)
                            .with_content(text.as_str()),
                    );
                }
            }
            RawContent::Blocks(blocks) => {
                for block in blocks.iter().filter_map(decode_block) {
                    if let ContentBlock::ToolResult { content, is_error } = block {
                        let event_type = if is_error {
                            EventType::Error
                        } else {
                            EventType::ToolResult
                        };
                        self.events.push(
                            Event::new(timestamp, event_type, self.agent_id)
                                .with_content(tool_result_text(&content)),
                        );
                    }
                }
            }
        }
    }

    fn process_assistant(&mut self, record: &RawRecord, timestamp: &str) {
        let request_id = record.request_id.as_deref().unwrap_or_default();
        let usage = record.message.usage.totals();

        if !request_id.is_empty() && self.counted_requests.insert(request_id.to_string()) {
            self.usage.add(usage);
        }

        let RawContent::Blocks(blocks) = &record.message.content else {
            return;
        };

        for block in blocks.iter().filter_map(decode_block) {
            match block {
                ContentBlock::Thinking { thinking } => {
                    if !thinking.trim().is_empty() {
                        let tokens = self.take_event_tokens(request_id, usage);
                        self.events.push(
                            Event::new(timestamp, EventType::Think, self.agent_id)
                                .with_content(thinking)
                                .with_tokens(tokens),
                        );
                    }
                }
                ContentBlock::Text { text } => {
                    let text = text.trim();
                    if !text.is_empty() {
                        let event = Event::new(timestamp, EventType::Text, self.agent_id);
                        self.events.push(event.with_content(text));
                    }
                }
                ContentBlock::ToolUse { name, input } => {
                    let tokens = self.take_event_tokens(request_id, usage);
                    let name = name.unwrap_or_else(|| "unknown".to_string());
                    let event = tool_use_event(timestamp, self.agent_id, &name, &input);
                    self.events.push(event.with_tokens(tokens));
                }
                ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
            }
        }
    }

    /// Tokens for the first qualifying event of a request, zeros afterwards.
    fn take_event_tokens(&mut self, request_id: &str, usage: TokenTotals) -> TokenTotals {
        if !request_id.is_empty() && self.attributed_requests.insert(request_id.to_string()) {
            usage
        } else {
            TokenTotals::default()
        }
    }
}

fn decode_block(value: &Value) -> Option<ContentBlock> {
    serde_json::from_value(value.clone()).ok()
}

/// Build the event for one `tool_use` block.
fn tool_use_event(timestamp: &str, agent_id: &str, name: &str, input: &Value) -> Event {
    let spec = tool_spec(name);
    let event_type = spec.map_or(EventType::ToolCall, |s| s.event_type);

    let file_path = match spec {
        Some(s) if s.targets_file => string_field(input, "file_path").unwrap_or_default(),
        _ => String::new(),
    };

    let content = match spec {
        Some(s) => s
            .content_fields
            .iter()
            .find_map(|field| string_field(input, field).filter(|v| !v.is_empty()))
            .unwrap_or_else(|| file_path.clone()),
        None => generic_input_text(input),
    };

    Event::new(timestamp, event_type, agent_id)
        .with_tool(name, file_path)
        .with_content(content)
}

fn string_field(input: &Value, field: &str) -> Option<String> {
    input.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Last-resort string form of a tool input.
fn generic_input_text(input: &Value) -> String {
    match input {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        v => v.to_string(),
    }
}

/// Flatten a tool result's `content` to text.
///
/// Block lists keep only their `text` blocks, joined by newlines.
fn tool_result_text(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .map(|b| b.get("text").and_then(Value::as_str).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n"),
        v => v.to_string(),
    }
}
