//! Media engine contract.
//!
//! The session controller drives capture and encoding only through
//! [`EngineAdapter`]. Start/stop calls return immediately; progress is
//! reported later as [`EngineSignal`]s pushed into the
//! [`EngineEventSink`] the engine was handed.

pub mod loopback;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::EngineError;
use crate::message::Rect;
use crate::resolution::{Resolution, SourceFit};

pub use loopback::{EngineCall, LoopbackEngine, LoopbackProbe};

/// Device id the engine treats as "the system default".
pub const DEFAULT_DEVICE_ID: &str = "default";

// ── Signals ──────────────────────────────────────────────────────

/// Asynchronous notifications from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSignal {
    Initialized,
    InitializeFailed {
        reason: String,
    },
    RecordingStarted,
    RecordingStopping,
    /// `code` is one of the `OUTPUT_*` result codes.
    RecordingStopped {
        code: i32,
        last_error: Option<String>,
    },
    StreamingStarted,
    StreamingStopping,
    StreamingStopped {
        code: i32,
        last_error: Option<String>,
    },
}

/// Receives engine signals. Implementations must be callable from any
/// thread the engine happens to run callbacks on.
pub trait EngineEventSink: Send + Sync {
    fn signal(&self, signal: EngineSignal);
}

// ── Audio devices ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioDeviceKind {
    /// Microphone / line-in.
    Input,
    /// Desktop audio.
    Output,
}

impl AudioDeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for AudioDeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub id: String,
    /// Human-readable name, matched against the host's description.
    pub name: String,
}

impl AudioDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// The engine's default device for `kind`.
    pub fn system_default(kind: AudioDeviceKind) -> Self {
        let name = match kind {
            AudioDeviceKind::Input => "Default Mic/Aux",
            AudioDeviceKind::Output => "Default Desktop Audio",
        };
        Self::new(DEFAULT_DEVICE_ID, name)
    }
}

/// First device whose name contains `description`.
pub fn select_device<'a>(devices: &'a [AudioDevice], description: &str) -> Option<&'a AudioDevice> {
    devices.iter().find(|d| d.name.contains(description))
}

// ── Requests & stats ─────────────────────────────────────────────

/// Everything the engine needs to build its pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct InitRequest {
    pub config_path: PathBuf,
    /// Title of the window to capture.
    pub title: String,
    pub resolution: Resolution,
    pub crop: Rect,
}

/// Cumulative counters of the stream output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStats {
    pub total_bytes: u64,
    pub total_frames: u32,
    pub dropped_frames: u32,
}

// ── EngineAdapter ────────────────────────────────────────────────

/// The operations the session controller needs from a media engine.
pub trait EngineAdapter: Send {
    /// Register the sink that receives every later signal.
    fn set_event_sink(&mut self, sink: Arc<dyn EngineEventSink>);

    /// Begin building the pipeline. Completion arrives as
    /// [`EngineSignal::Initialized`] or [`EngineSignal::InitializeFailed`];
    /// an `Err` here means it failed before anything was attempted.
    fn initialize(&mut self, request: &InitRequest) -> Result<(), EngineError>;

    /// `false` if the output refused to start.
    fn start_recording(&mut self, path: &Path) -> bool;
    fn stop_recording(&mut self, force: bool);

    /// `false` if the output refused to start.
    fn start_streaming(&mut self, server: &str, key: &str) -> bool;
    fn stop_streaming(&mut self, force: bool);

    /// Tear everything down. Calling it again is a no-op.
    fn release(&mut self);

    /// `None` when no stream output exists.
    fn stream_stats(&self) -> Option<StreamStats>;

    fn list_devices(&self, kind: AudioDeviceKind) -> Result<Vec<AudioDevice>, EngineError>;
    fn set_audio_device(&mut self, kind: AudioDeviceKind, device: &AudioDevice) -> Result<(), EngineError>;
    fn set_downmix_mono(&mut self, kind: AudioDeviceKind, enable: bool) -> Result<(), EngineError>;
    fn set_muted(&mut self, kind: AudioDeviceKind, mute: bool) -> Result<(), EngineError>;

    fn update_video_config(&mut self, cursor: bool, compatibility: bool) -> Result<(), EngineError>;

    /// Rescale and reposition the captured source on the canvas.
    fn apply_layout(&mut self, resolution: &Resolution, fit: SourceFit) -> Result<(), EngineError>;

    /// Crop the captured window to `rect` (window coordinates).
    fn crop_source(&mut self, rect: Rect) -> Result<(), EngineError>;
}
