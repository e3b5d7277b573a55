//! Configuration for the worker process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use reclink_core::network::DEFAULT_SOCKET_PATH;
use reclink_core::{ChannelEndpoint, ChannelRole, ReclinkError};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Local socket settings.
    pub channel: ChannelConfig,
    /// Session behaviour.
    pub session: SessionSection,
    /// Media engine selection.
    pub engine: EngineConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Shutdown timing.
    pub shutdown: ShutdownConfig,
}

/// Local socket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub socket_path: PathBuf,
    /// "listen" (bind and serve one host) or "connect" (dial the host).
    pub role: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Start a recording alongside every stream.
    pub record_when_streaming: bool,
}

/// Media engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine implementation. Only "loopback" ships.
    pub kind: String,
    /// Bytes the loopback engine reports as sent per stats query.
    pub stats_bytes_per_tick: u64,
    /// Frames the loopback engine reports as sent per stats query.
    pub stats_frames_per_tick: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long the worker may take to stop outputs and release the
    /// engine after the host hangs up.
    pub grace_ms: u64,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            role: ChannelRole::Listen.to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: "loopback".into(),
            stats_bytes_per_tick: 250_000,
            stats_frames_per_tick: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_ms: 1000 }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Why [`WorkerConfig::try_load`] fell back to defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadIssue {
    /// No readable file at the path.
    Missing,
    /// The file exists but is not valid TOML for this schema.
    Invalid(String),
}

impl fmt::Display for LoadIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("no config file"),
            Self::Invalid(e) => write!(f, "invalid config: {e}"),
        }
    }
}

impl WorkerConfig {
    /// Read and parse a TOML file. Logs nothing.
    pub fn try_load(path: &Path) -> Result<Self, LoadIssue> {
        let contents = std::fs::read_to_string(path).map_err(|_| LoadIssue::Missing)?;
        toml::from_str(&contents).map_err(|e| LoadIssue::Invalid(e.to_string()))
    }

    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        Self::try_load(path).unwrap_or_else(|issue| {
            match issue {
                LoadIssue::Missing => {
                    tracing::info!("no config at {}; using defaults", path.display())
                }
                LoadIssue::Invalid(e) => {
                    tracing::warn!("invalid config {}: {e}; using defaults", path.display())
                }
            }
            Self::default()
        })
    }

    /// The socket endpoint described by the `channel` section.
    pub fn endpoint(&self) -> Result<ChannelEndpoint, ReclinkError> {
        let role: ChannelRole = self.channel.role.parse()?;
        Ok(ChannelEndpoint::new(&self.channel.socket_path, role))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown.grace_ms)
    }
}

// ── Tests ────────────────────────────────────────────────────────
