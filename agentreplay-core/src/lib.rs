//! # agentreplay-core
//!
//! Ingestion core for agentreplay - a replay and live viewer for AI
//! coding-agent sessions.
//!
//! This library provides:
//! - Domain types for sessions, agents and events
//! - Format detection and per-format transcript parsing
//! - Sub-agent discovery and merge with exactly-once token attribution
//! - Multi-directory session discovery with cached summaries
//! - Change detection and delta tailing, for one session or merged across projects
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three stages:
//! - **Discovery:** [`DirectoryScanner`] lists session files as [`SessionSummary`] records
//! - **Assembly:** [`SessionAssembler`] parses one file and its sub-agent logs into a [`Session`]
//! - **Tailing:** [`tail`] re-assembles on change and emits only what is new
//!
//! Nothing is persisted; every result is a pure function of the files on disk.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agentreplay_core::{Config, DirectoryScanner, SessionAssembler};
//! use std::path::Path;
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // List sessions, then assemble the most recent one
//! let scanner = DirectoryScanner::new(&config.scanner);
//! let assembler = SessionAssembler::from_config(&config.assembler);
//! if let Some(latest) = scanner.scan().expect("scan failed").first() {
//!     let session = assembler.assemble(Path::new(&latest.file_path)).expect("parse failed");
//!     println!("{}: {} events", session.id, session.event_count());
//! }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::SessionAssembler;
pub use scan::{CachePolicy, DirectoryScanner, SourceRoot};
pub use tail::{ChangeDetector, Fingerprint, InitialView, SessionDelta, SessionTail, TailUpdate};
pub use types::*;

// Public modules
pub mod config;
pub mod error;
pub mod format;
pub mod ingest;
pub mod logging;
pub mod merge;
pub mod scan;
pub mod tail;
pub mod types;
