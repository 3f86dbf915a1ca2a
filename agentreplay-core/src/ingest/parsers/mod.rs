//! Format-specific parsers
//!
//! Each transcript format has a parser module that implements
//! the [`TranscriptParser`](super::TranscriptParser) trait.
//!
//! ## Supported Formats
//!
//! | Format | Module | Status |
//! |--------|--------|--------|
//! | Claude Code | [`claude`] | ✅ Implemented |
//! | Codex | [`codex`] | ⛔ Summaries only, parsing fails explicitly |
//! | Gemini | [`gemini`] | ⛔ Summaries only, parsing fails explicitly |

mod claude;
mod codex;
mod gemini;

pub use claude::{tool_spec, ClaudeCodeParser, ToolSpec, TOOL_TABLE};
pub use codex::CodexParser;
pub use gemini::GeminiParser;

use super::TranscriptParser;
use crate::types::TranscriptFormat;

/// Create one parser per transcript format.
pub fn create_all_parsers() -> Vec<Box<dyn TranscriptParser>> {
    vec![
        Box::new(ClaudeCodeParser::new()),
        Box::new(CodexParser::new()),
        Box::new(GeminiParser::new()),
    ]
}

/// Get the parser for a transcript format.
///
/// Every format has a strategy; unsupported ones fail when asked to parse.
pub fn parser_for(format: TranscriptFormat) -> Box<dyn TranscriptParser> {
    match format {
        TranscriptFormat::ClaudeCode => Box::new(ClaudeCodeParser::new()),
        TranscriptFormat::Codex => Box::new(CodexParser::new()),
        TranscriptFormat::Gemini => Box::new(GeminiParser::new()),
    }
}
