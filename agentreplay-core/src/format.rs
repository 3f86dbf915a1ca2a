//! Display helpers shared by every consumer of the event stream.

use std::path::{Component, Path, PathBuf};

/// Default width of [`summarize`] output, in characters.
pub const SUMMARY_MAX_CHARS: usize = 120;

/// Collapse `text` onto one line and cap it at [`SUMMARY_MAX_CHARS`].
pub fn summarize(text: &str) -> String {
    summarize_to(text, SUMMARY_MAX_CHARS)
}

/// Collapse whitespace runs to single spaces; if the result is longer than
/// `max_chars`, keep `max_chars - 1` characters and append an ellipsis.
pub fn summarize_to(text: &str, max_chars: usize) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() > max_chars {
        let mut short: String = line.chars().take(max_chars.saturating_sub(1)).collect();
        short.push('\u{2026}');
        short
    } else {
        line
    }
}

/// Shorten a file path to its last two components.
///
/// Paths deeper than three components get a leading `…` segment; a single
/// component is returned bare.
pub fn short_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }

    let parts: Vec<Component<'_>> = Path::new(path).components().collect();
    let shortened: PathBuf = match parts.len() {
        0 => return String::new(),
        1 => parts.iter().collect(),
        2 | 3 => parts[parts.len() - 2..].iter().collect(),
        n => {
            let mut p = PathBuf::from("\u{2026}");
            p.push(parts[n - 2]);
            p.push(parts[n - 1]);
            p
        }
    };
    shortened.to_string_lossy().into_owned()
}
