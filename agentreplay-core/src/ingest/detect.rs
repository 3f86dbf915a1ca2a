//! Transcript format detection
//!
//! Reads the head of a file until a decisive signal is seen. Signals are
//! sentinel fields or values that only one tool writes. Detection is total
//! over any byte content: malformed, blank and non-UTF-8 lines are skipped,
//! and a scan that finds nothing decisive returns [`DEFAULT_FORMAT`].

use super::lines::{parse_object, LossyLines};
use crate::error::Result;
use crate::types::TranscriptFormat;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Least specific guess, returned when no signal is found.
pub const DEFAULT_FORMAT: TranscriptFormat = TranscriptFormat::Codex;

/// Default number of lines read before giving up.
pub const DEFAULT_DETECT_LINE_LIMIT: usize = 50;

/// Claude Code record types that carry a `sessionId`.
const CLAUDE_SESSION_RECORD_TYPES: &[&str] = &["user", "assistant", "progress"];

/// Record types written only by the Gemini CLI.
const GEMINI_RECORD_TYPES: &[&str] = &["session_metadata", "message_update"];

/// Detect the format of a transcript file.
///
/// Only opening the file can fail; everything after that is total.
pub fn detect_file(path: &Path, line_limit: usize) -> Result<TranscriptFormat> {
    let file = File::open(path)?;
    let format = detect_reader(BufReader::new(file), line_limit);
    tracing::debug!(path = %path.display(), format = %format, "Detected transcript format");
    Ok(format)
}

/// Detect the format of JSON-lines content, reading at most `line_limit` lines.
pub fn detect_reader<R: BufRead>(reader: R, line_limit: usize) -> TranscriptFormat {
    for line in LossyLines::new(reader).take(line_limit) {
        let Ok(line) = line else {
            break;
        };
        let Some(record) = parse_object(&line) else {
            continue;
        };
        if let Some(format) = classify(&record) {
            return format;
        }
    }
    DEFAULT_FORMAT
}

/// Return the format a single record proves, if any.
fn classify(record: &Map<String, Value>) -> Option<TranscriptFormat> {
    let record_type = record.get("type").and_then(Value::as_str);

    if record_type == Some("file-history-snapshot") {
        return Some(TranscriptFormat::ClaudeCode);
    }
    if record.contains_key("sessionId")
        && record_type.is_some_and(|t| CLAUDE_SESSION_RECORD_TYPES.contains(&t))
    {
        return Some(TranscriptFormat::ClaudeCode);
    }
    if record_type.is_some_and(|t| GEMINI_RECORD_TYPES.contains(&t)) {
        return Some(TranscriptFormat::Gemini);
    }
    None
}
