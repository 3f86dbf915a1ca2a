//! Parser trait abstraction
//!
//! Every transcript format has a [`TranscriptParser`] strategy that decodes
//! one JSON-lines stream (the main log or one sub-agent log) into events for
//! a single agent.
//!
//! ## Design Principles
//!
//! 1. **Resilience**: a record that fails to decode is skipped, never fatal
//! 2. **Tolerant records**: every field decodes with a default; absence is never an error
//! 3. **Explicit gaps**: formats without a parser fail with
//!    [`Error::UnsupportedFormat`](crate::Error::UnsupportedFormat) instead of
//!    returning an empty stream

use crate::error::Result;
use crate::types::{Event, TokenTotals, TranscriptFormat, MAIN_AGENT_ID};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::path::Path;

/// Which agent a stream's events are attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOwner {
    /// The primary transcript; events belong to `"main"`
    Main,
    /// A sub-agent log. The agent id comes from the stream's first record,
    /// falling back to `fallback_id` (derived from the file name).
    SubAgent { fallback_id: String },
}

impl StreamOwner {
    /// Agent id to use when the stream itself does not name one.
    pub fn default_agent_id(&self) -> &str {
        match self {
            StreamOwner::Main => MAIN_AGENT_ID,
            StreamOwner::SubAgent { fallback_id } => fallback_id,
        }
    }
}

/// Session-level metadata found while reading a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamMetadata {
    /// First session id seen on any record (used for sub-agent lookup)
    pub first_session_id: Option<String>,
    /// Fields from the first user/assistant record that carries a session id
    pub session: Option<SessionMetadata>,
}

/// Metadata copied onto [`Session`](crate::types::Session).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub session_id: String,
    pub slug: String,
    pub version: String,
    pub branch: String,
    pub start_time: String,
}

/// Result of decoding one stream.
#[derive(Debug, Default)]
pub struct ParsedStream {
    /// Agent every event in `events` is attributed to
    pub agent_id: String,
    /// Records that decoded (zero means the stream contributes nothing)
    pub record_count: usize,
    pub metadata: StreamMetadata,
    /// Events in file order
    pub events: Vec<Event>,
    /// Agent-level usage, counted once per request id
    pub usage: TokenTotals,
}

/// Trait implemented by all transcript parsers.
///
/// Implementations hold no per-call state and may be shared across threads.
pub trait TranscriptParser: Send + Sync {
    /// Which format this parser handles
    fn format(&self) -> TranscriptFormat;

    /// Decode one JSON-lines stream for one agent.
    ///
    /// ## Error Handling
    ///
    /// - Lines that fail to decode are skipped
    /// - Only I/O errors (file not found, unreadable) and an unsupported
    ///   format return `Err`
    fn parse_stream(&self, path: &Path, owner: &StreamOwner) -> Result<ParsedStream>;
}

/// Field deserializer that maps a wrong or missing shape to `T::default()`.
///
/// Use with `#[serde(default, deserialize_with = "lenient")]` so one bad
/// field never discards the whole record.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}
