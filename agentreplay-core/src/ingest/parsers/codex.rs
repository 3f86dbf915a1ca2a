//! Codex CLI rollout parser
//!
//! Codex writes rollouts under `~/.codex/sessions/YYYY/MM/DD/rollout-*.jsonl`.
//! The scanner summarizes them (session id, token counts), but turning a
//! rollout into events is not implemented: [`CodexParser::parse_stream`]
//! fails with [`Error::UnsupportedFormat`] so callers never mistake an
//! unparsed rollout for an empty session.

use crate::error::{Error, Result};
use crate::ingest::parser::{ParsedStream, StreamOwner, TranscriptParser};
use crate::types::TranscriptFormat;
use std::path::Path;

/// Parser for OpenAI Codex CLI rollouts.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodexParser;

impl CodexParser {
    pub fn new() -> Self {
        Self
    }
}

impl TranscriptParser for CodexParser {
    fn format(&self) -> TranscriptFormat {
        TranscriptFormat::Codex
    }

    fn parse_stream(&self, path: &Path, _owner: &StreamOwner) -> Result<ParsedStream> {
        tracing::warn!(path = %path.display(), "Codex rollout parsing requested");
        Err(Error::UnsupportedFormat {
            format: self.format(),
        })
    }
}
