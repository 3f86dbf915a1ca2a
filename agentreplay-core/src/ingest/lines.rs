//! Line reading for JSON-lines transcripts.
//!
//! Transcripts are read byte-wise and decoded lossily so that a stray invalid
//! UTF-8 sequence damages one line at most, never the whole read.

use std::io::{self, BufRead};

/// Iterator over the lines of a reader, decoded as lossy UTF-8.
///
/// Trailing `\n` / `\r\n` are stripped. Blank lines are yielded as-is; callers
/// decide whether to skip them.
pub(crate) struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LossyLines<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for LossyLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Decode a line as a JSON object, or `None` for blank, malformed or
/// non-object lines.
pub(crate) fn parse_object(line: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}
