//! Per-session output settings.
//!
//! A [`SessionConfig`] is immutable once built. The controller holds the
//! current one behind an `Arc` and swaps in a new value on change, so an
//! output keeps the exact snapshot it was started with.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Reconnect attempts a stream would get. Reconnect is disabled, so the
/// controller only reports these values.
pub const STREAM_RETRY_LIMIT: u32 = 3;

/// Delay between reconnect attempts. See [`STREAM_RETRY_LIMIT`].
pub const STREAM_RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionConfig {
    /// Last recording target; empty until the first `StartRecording`.
    pub output_path: PathBuf,
    pub server: String,
    pub key: String,
    /// Start and stop a recording together with every stream.
    pub record_when_streaming: bool,
}

impl SessionConfig {
    pub fn new(record_when_streaming: bool) -> Arc<Self> {
        Arc::new(Self {
            record_when_streaming,
            ..Self::default()
        })
    }

    /// Copy with a new recording path.
    pub fn with_output_path(&self, path: &Path) -> Arc<Self> {
        Arc::new(Self {
            output_path: path.to_path_buf(),
            ..self.clone()
        })
    }

    /// Copy with a new stream target.
    pub fn with_stream_target(&self, server: &str, key: &str) -> Arc<Self> {
        Arc::new(Self {
            server: server.to_string(),
            key: key.to_string(),
            ..self.clone()
        })
    }

    pub fn has_output_path(&self) -> bool {
        !self.output_path.as_os_str().is_empty()
    }
}
