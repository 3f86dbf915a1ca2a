//! Gemini CLI session parser
//!
//! Gemini sessions live under `~/.gemini/tmp/<project-hash>/` as
//! `logs.json` or `session-*.jsonl`. Only summaries are extracted for them;
//! event parsing reports [`Error::UnsupportedFormat`].

use crate::error::{Error, Result};
use crate::ingest::parser::{ParsedStream, StreamOwner, TranscriptParser};
use crate::types::TranscriptFormat;
use std::path::Path;

/// Parser for Gemini CLI session logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeminiParser;

impl GeminiParser {
    pub fn new() -> Self {
        Self
    }
}

impl TranscriptParser for GeminiParser {
    fn format(&self) -> TranscriptFormat {
        TranscriptFormat::Gemini
    }

    fn parse_stream(&self, path: &Path, _owner: &StreamOwner) -> Result<ParsedStream> {
        tracing::warn!(path = %path.display(), "Gemini session parsing requested");
        Err(Error::UnsupportedFormat {
            format: self.format(),
        })
    }
}
