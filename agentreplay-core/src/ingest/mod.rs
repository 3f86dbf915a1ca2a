//! Ingestion layer for turning transcript files into sessions
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  Session File   │ ──► │  FormatDetector  │ ──► │ SessionAssembler│ ──► Session
//! │ (~/.claude/...) │     │  (detect.rs)     │     │                 │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!                                                         │
//!                              ┌──────────────────────────┤
//!                              ▼                          ▼
//!                   ┌──────────────────────┐   ┌────────────────────┐
//!                   │  TranscriptParser    │   │  subagents.rs      │
//!                   │  ├─ ClaudeCodeParser │   │  <stem>/subagents  │
//!                   │  ├─ CodexParser      │   │  <id>/subagents    │
//!                   │  └─ GeminiParser     │   └────────────────────┘
//!                   └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use agentreplay_core::ingest::SessionAssembler;
//! use std::path::Path;
//!
//! let assembler = SessionAssembler::default();
//! let session = assembler.assemble(Path::new("session.jsonl"))?;
//! println!("{} events from {} agents", session.event_count(), session.agents.len());
//! # Ok::<(), agentreplay_core::Error>(())
//! ```

mod assembler;
pub mod detect;
pub(crate) mod lines;
mod parser;
pub mod parsers;
pub mod subagents;

pub use assembler::SessionAssembler;
pub use detect::{detect_file, detect_reader, DEFAULT_DETECT_LINE_LIMIT, DEFAULT_FORMAT};
pub use parser::{ParsedStream, SessionMetadata, StreamMetadata, StreamOwner, TranscriptParser};
pub use parsers::{create_all_parsers, parser_for};
