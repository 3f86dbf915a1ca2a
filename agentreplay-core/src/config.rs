//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/agentreplay/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/agentreplay/` (~/.config/agentreplay/)
//! - State/Logs: `$XDG_STATE_HOME/agentreplay/` (~/.local/state/agentreplay/)
//!
//! The `AGENTREPLAY_DATA_DIR` environment variable pins scanning to a single
//! directory, overriding `scanner.data_dir`.

use crate::error::{Error, Result};
use crate::types::Source;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that pins scanning to one directory.
pub const DATA_DIR_ENV: &str = "AGENTREPLAY_DATA_DIR";

/// Returns a best-effort home directory path.
pub(crate) fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Session discovery
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Transcript assembly
    #[serde(default)]
    pub assembler: AssemblerConfig,

    /// Live tailing
    #[serde(default)]
    pub tail: TailConfig,

    /// Multi-session merged feed
    #[serde(default)]
    pub merge: MergeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scanner configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    /// Scan only this directory, labelling every session as `claude`
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Seconds since last modification for a session to count as active
    #[serde(default = "default_active_threshold_secs")]
    pub active_threshold_secs: u64,

    /// Seconds a scan result stays cached
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Lines inspected for metadata at the head of each file
    #[serde(default = "default_metadata_line_limit")]
    pub metadata_line_limit: usize,

    /// Characters of the file stem used when the parent dir name is generic
    #[serde(default = "default_project_name_max_chars")]
    pub project_name_max_chars: usize,

    /// Replaces the built-in source roots when non-empty
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            active_threshold_secs: default_active_threshold_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            metadata_line_limit: default_metadata_line_limit(),
            project_name_max_chars: default_project_name_max_chars(),
            sources: vec![],
        }
    }
}

impl ScannerConfig {
    pub fn active_threshold(&self) -> Duration {
        Duration::from_secs(self.active_threshold_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn default_active_threshold_secs() -> u64 {
    60
}

fn default_cache_ttl_secs() -> u64 {
    5
}

fn default_metadata_line_limit() -> usize {
    20
}

fn default_project_name_max_chars() -> usize {
    20
}

/// One configured `(root, source, patterns)` triple.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Root directory; a leading `~/` expands to the home directory
    pub root: PathBuf,
    /// Which tool writes the logs under this root
    pub source: Source,
    /// Glob patterns relative to `root`; empty means the source's defaults
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Assembler configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AssemblerConfig {
    /// Lines the format detector reads before falling back to its default
    #[serde(default = "default_detect_line_limit")]
    pub detect_line_limit: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            detect_line_limit: default_detect_line_limit(),
        }
    }
}

fn default_detect_line_limit() -> usize {
    50
}

/// Tail loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TailConfig {
    /// Poll interval for a single-session tail
    #[serde(default = "default_session_poll_secs")]
    pub session_poll_secs: u64,

    /// Poll interval for the merged multi-session tail
    #[serde(default = "default_merged_poll_secs")]
    pub merged_poll_secs: u64,

    /// Events sent on first observation of a file
    #[serde(default = "default_initial_tail")]
    pub initial_tail: usize,

    /// Upper bound for one fingerprint + reassembly
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            session_poll_secs: default_session_poll_secs(),
            merged_poll_secs: default_merged_poll_secs(),
            initial_tail: default_initial_tail(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl TailConfig {
    pub fn session_poll_interval(&self) -> Duration {
        Duration::from_secs(self.session_poll_secs)
    }

    pub fn merged_poll_interval(&self) -> Duration {
        Duration::from_secs(self.merged_poll_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

fn default_session_poll_secs() -> u64 {
    2
}

fn default_merged_poll_secs() -> u64 {
    3
}

fn default_initial_tail() -> usize {
    20
}

fn default_read_timeout_secs() -> u64 {
    30
}

/// Merged feed configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MergeConfig {
    /// Most recent sessions (one per project) merged into the feed
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Events kept from the end of the merged stream
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            max_events: default_max_events(),
        }
    }
}

fn default_max_sessions() -> usize {
    20
}

fn default_max_events() -> usize {
    2000
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of rotated log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,

    /// Where log lines are written
    #[serde(default)]
    pub target: LogTarget,
}

/// Log destination
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Rotated files in the state directory
    #[default]
    File,
    Stderr,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
            target: LogTarget::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path, then apply env overrides
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Apply `AGENTREPLAY_DATA_DIR`, if set and non-empty.
    pub fn apply_env(&mut self) {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            self.scanner.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/agentreplay/config.toml` (~/.config/agentreplay/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("agentreplay").join("config.toml")
    }

    /// Returns the state directory path (for rotated logs)
    ///
    /// `$XDG_STATE_HOME/agentreplay/` (~/.local/state/agentreplay/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("agentreplay")
    }
}

/// Expand a leading `~/` against the home directory.
pub(crate) fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}
