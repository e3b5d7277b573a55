//! Domain-specific error types for the reclink worker.
//!
//! Three layers:
//! - [`ProtocolError`] for anything wrong with bytes on the channel,
//! - [`EngineError`] for failures reported by the media engine,
//! - [`ReclinkError`], the crate-wide error that wraps both.
//!
//! [`OutputFailure`] is the fixed cause taxonomy for engine output
//! result codes; its `Display` text is what reaches the host in an
//! `ErrorOccurred` event.

use thiserror::Error;

// ── ProtocolError ────────────────────────────────────────────────

/// A frame on the command channel could not be decoded or encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The tag byte does not name any known message.
    #[error("unknown message tag: {0}")]
    UnknownTag(u8),

    /// The tag is known but is not valid in this direction
    /// (e.g. an event tag arriving at the worker).
    #[error("unexpected {direction} tag: {tag}")]
    UnexpectedTag { tag: u8, direction: &'static str },

    /// The length prefix announced zero bytes, so not even a tag follows.
    #[error("empty frame")]
    EmptyFrame,

    /// The payload ended before a field was complete.
    #[error("truncated payload: needed {needed} more bytes for {field}")]
    Truncated { field: &'static str, needed: usize },

    /// The payload had bytes left after the last field.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    /// A boolean field held something other than 0 or 1.
    #[error("invalid boolean byte: {0:#04x}")]
    InvalidBool(u8),

    /// A string field was not valid UTF-8.
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    /// An error-kind byte did not map to a known kind.
    #[error("invalid error kind: {0}")]
    InvalidErrorKind(u8),

    /// The encoded frame would not fit the u16 length prefix.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

// ── EngineError ──────────────────────────────────────────────────

/// Failure reported synchronously by an engine adapter call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine has not been initialized (or was released).
    #[error("engine not initialized")]
    NotInitialized,

    /// The engine rejected the request.
    #[error("{0}")]
    Rejected(String),
}

// ── OutputFailure ────────────────────────────────────────────────

/// Output result code reported by the engine on a successful stop.
pub const OUTPUT_SUCCESS: i32 = 0;
pub const OUTPUT_BAD_PATH: i32 = -1;
pub const OUTPUT_CONNECT_FAILED: i32 = -2;
pub const OUTPUT_INVALID_STREAM: i32 = -3;
pub const OUTPUT_ERROR: i32 = -4;
pub const OUTPUT_DISCONNECTED: i32 = -5;
pub const OUTPUT_UNSUPPORTED: i32 = -6;
pub const OUTPUT_NO_SPACE: i32 = -7;

/// Why an output (recording file or live stream) stopped abnormally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputFailure {
    #[error("not enough disk space")]
    StorageExhausted,

    #[error("unsupported output format")]
    UnsupportedFormat,

    #[error("invalid stream address")]
    InvalidAddress,

    #[error("could not connect to the server")]
    ConnectFailed,

    #[error("invalid stream key or server refused access")]
    InvalidStream,

    #[error("unexpected server error (code {0})")]
    ServerError(i32),

    #[error("disconnected from the server")]
    Disconnected,

    #[error("unspecified output error (code {0})")]
    Unspecified(i32),
}

impl OutputFailure {
    /// Map a recording stop code. `None` means the recording finished
    /// cleanly.
    pub fn from_recording_code(code: i32) -> Option<Self> {
        match code {
            OUTPUT_SUCCESS => None,
            OUTPUT_NO_SPACE => Some(Self::StorageExhausted),
            OUTPUT_UNSUPPORTED => Some(Self::UnsupportedFormat),
            other => Some(Self::Unspecified(other)),
        }
    }

    /// Map a streaming stop code. `None` means the stream ended cleanly.
    pub fn from_streaming_code(code: i32) -> Option<Self> {
        match code {
            OUTPUT_SUCCESS => None,
            OUTPUT_BAD_PATH => Some(Self::InvalidAddress),
            OUTPUT_CONNECT_FAILED => Some(Self::ConnectFailed),
            OUTPUT_INVALID_STREAM => Some(Self::InvalidStream),
            OUTPUT_ERROR => Some(Self::ServerError(code)),
            OUTPUT_DISCONNECTED => Some(Self::Disconnected),
            other => Some(Self::Unspecified(other)),
        }
    }
}

// ── ReclinkError ─────────────────────────────────────────────────

/// The canonical error type for the reclink crates.
#[derive(Debug, Error)]
pub enum ReclinkError {
    // ── Protocol ─────────────────────────────────────────────────
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // ── Connection ───────────────────────────────────────────────
    /// The socket layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// A second client tried to attach while one is being served.
    #[error("a client is already connected")]
    AlreadyConnected,

    // ── Session ──────────────────────────────────────────────────
    /// A lifecycle or output phase change was attempted from the wrong phase.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    /// The resolution planner could not produce a usable output size.
    #[error("invalid resolution for screen {width}x{height}")]
    InvalidResolution { width: i32, height: i32 },

    /// The media engine reported a failure.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The worker thread could not be started or joined.
    #[error("worker error: {0}")]
    Worker(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl From<String> for ReclinkError {
    fn from(s: String) -> Self {
        ReclinkError::Other(s)
    }
}

impl From<&str> for ReclinkError {
    fn from(s: &str) -> Self {
        ReclinkError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ReclinkError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ReclinkError::ChannelClosed
    }
}
