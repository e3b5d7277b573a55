//! Typed commands (host → worker) and events (worker → host).
//!
//! Uses proper enums with `TryFrom`; unknown tags become a
//! [`ProtocolError`], never a panic.

use std::fmt;
use std::path::PathBuf;

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::wire::{WireReader, put_bool, put_i32, put_string};

// ── Tag ──────────────────────────────────────────────────────────

/// Message tag byte carried right after the length prefix.
///
/// - `0..=13`: commands
/// - `14..=19`: events
/// - `20`: stream statistics request (added after the event range)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Init = 0,
    ScaleVideo = 1,
    CropVideo = 2,
    UpdateVideoConfig = 3,
    ResetAudioInput = 4,
    ResetAudioOutput = 5,
    DownmixMonoInput = 6,
    DownmixMonoOutput = 7,
    MuteAudioInput = 8,
    MuteAudioOutput = 9,
    StartRecording = 10,
    StopRecording = 11,
    StartStreaming = 12,
    StopStreaming = 13,

    Initialized = 14,
    RecordingStarted = 15,
    RecordingStopped = 16,
    StreamingStarted = 17,
    StreamingStopped = 18,
    ErrorOccurred = 19,

    LogStreamStats = 20,
}

impl TryFrom<u8> for Tag {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Tag::Init),
            1 => Ok(Tag::ScaleVideo),
            2 => Ok(Tag::CropVideo),
            3 => Ok(Tag::UpdateVideoConfig),
            4 => Ok(Tag::ResetAudioInput),
            5 => Ok(Tag::ResetAudioOutput),
            6 => Ok(Tag::DownmixMonoInput),
            7 => Ok(Tag::DownmixMonoOutput),
            8 => Ok(Tag::MuteAudioInput),
            9 => Ok(Tag::MuteAudioOutput),
            10 => Ok(Tag::StartRecording),
            11 => Ok(Tag::StopRecording),
            12 => Ok(Tag::StartStreaming),
            13 => Ok(Tag::StopStreaming),
            14 => Ok(Tag::Initialized),
            15 => Ok(Tag::RecordingStarted),
            16 => Ok(Tag::RecordingStopped),
            17 => Ok(Tag::StreamingStarted),
            18 => Ok(Tag::StreamingStopped),
            19 => Ok(Tag::ErrorOccurred),
            20 => Ok(Tag::LogStreamStats),
            _ => Err(ProtocolError::UnknownTag(value)),
        }
    }
}

impl Tag {
    /// Returns `true` for tags the host sends to the worker.
    pub fn is_command(self) -> bool {
        !matches!(
            self,
            Tag::Initialized
                | Tag::RecordingStarted
                | Tag::RecordingStopped
                | Tag::StreamingStarted
                | Tag::StreamingStopped
                | Tag::ErrorOccurred
        )
    }
}

// ── ErrorKind ────────────────────────────────────────────────────

/// Which part of the session an `ErrorOccurred` event is about.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Initializing = 1,
    Recording = 2,
    Streaming = 3,
    Client = 4,
}

impl TryFrom<u8> for ErrorKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ErrorKind::Initializing),
            2 => Ok(ErrorKind::Recording),
            3 => Ok(ErrorKind::Streaming),
            4 => Ok(ErrorKind::Client),
            _ => Err(ProtocolError::InvalidErrorKind(value)),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Geometry ─────────────────────────────────────────────────────

/// Width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// `true` when either extent is zero or negative.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            width: reader.i32("size.width")?,
            height: reader.i32("size.height")?,
        })
    }

    fn write(&self, dst: &mut BytesMut) {
        put_i32(dst, self.width);
        put_i32(dst, self.height);
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle: top-left corner plus extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// `true` when the rectangle has no area.
    pub fn is_empty(&self) -> bool {
        self.size().is_empty()
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            x: reader.i32("rect.x")?,
            y: reader.i32("rect.y")?,
            width: reader.i32("rect.width")?,
            height: reader.i32("rect.height")?,
        })
    }

    fn write(&self, dst: &mut BytesMut) {
        put_i32(dst, self.x);
        put_i32(dst, self.y);
        put_i32(dst, self.width);
        put_i32(dst, self.height);
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{} {}x{})", self.x, self.y, self.width, self.height)
    }
}

// ── Message ──────────────────────────────────────────────────────

/// A value that travels as the body of one frame.
pub trait Message: Sized {
    /// Used in logs and errors ("command" / "event").
    const DIRECTION: &'static str;

    fn tag(&self) -> Tag;

    fn encode_payload(&self, dst: &mut BytesMut) -> Result<(), ProtocolError>;

    /// Decode the payload of a frame already known to carry `tag`.
    /// Implementations must consume the whole payload.
    fn decode_payload(tag: Tag, payload: &mut WireReader<'_>) -> Result<Self, ProtocolError>;
}

// ── Command ──────────────────────────────────────────────────────

/// Everything the host can ask the worker to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Init {
        config_path: PathBuf,
        title: String,
        screen_size: Size,
        crop_rect: Rect,
    },
    ScaleVideo {
        size: Size,
    },
    CropVideo {
        rect: Rect,
    },
    UpdateVideoConfig {
        cursor: bool,
        compatibility: bool,
    },
    ResetAudioInput {
        device_id: String,
        device_desc: String,
    },
    ResetAudioOutput {
        device_id: String,
        device_desc: String,
    },
    DownmixMonoInput {
        enable: bool,
    },
    DownmixMonoOutput {
        enable: bool,
    },
    MuteAudioInput {
        mute: bool,
    },
    MuteAudioOutput {
        mute: bool,
    },
    StartRecording {
        output_path: PathBuf,
    },
    StopRecording {
        force: bool,
    },
    StartStreaming {
        server: String,
        key: String,
    },
    StopStreaming {
        force: bool,
    },
    LogStreamStats,
}

fn path_to_wire(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Message for Command {
    const DIRECTION: &'static str = "command";

    fn tag(&self) -> Tag {
        match self {
            Command::Init { .. } => Tag::Init,
            Command::ScaleVideo { .. } => Tag::ScaleVideo,
            Command::CropVideo { .. } => Tag::CropVideo,
            Command::UpdateVideoConfig { .. } => Tag::UpdateVideoConfig,
            Command::ResetAudioInput { .. } => Tag::ResetAudioInput,
            Command::ResetAudioOutput { .. } => Tag::ResetAudioOutput,
            Command::DownmixMonoInput { .. } => Tag::DownmixMonoInput,
            Command::DownmixMonoOutput { .. } => Tag::DownmixMonoOutput,
            Command::MuteAudioInput { .. } => Tag::MuteAudioInput,
            Command::MuteAudioOutput { .. } => Tag::MuteAudioOutput,
            Command::StartRecording { .. } => Tag::StartRecording,
            Command::StopRecording { .. } => Tag::StopRecording,
            Command::StartStreaming { .. } => Tag::StartStreaming,
            Command::StopStreaming { .. } => Tag::StopStreaming,
            Command::LogStreamStats => Tag::LogStreamStats,
        }
    }

    fn encode_payload(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            Command::Init {
                config_path,
                title,
                screen_size,
                crop_rect,
            } => {
                put_string(dst, &path_to_wire(config_path))?;
                put_string(dst, title)?;
                screen_size.write(dst);
                crop_rect.write(dst);
            }
            Command::ScaleVideo { size } => size.write(dst),
            Command::CropVideo { rect } => rect.write(dst),
            Command::UpdateVideoConfig {
                cursor,
                compatibility,
            } => {
                put_bool(dst, *cursor);
                put_bool(dst, *compatibility);
            }
            Command::ResetAudioInput {
                device_id,
                device_desc,
            }
            | Command::ResetAudioOutput {
                device_id,
                device_desc,
            } => {
                put_string(dst, device_id)?;
                put_string(dst, device_desc)?;
            }
            Command::DownmixMonoInput { enable } | Command::DownmixMonoOutput { enable } => {
                put_bool(dst, *enable)
            }
            Command::MuteAudioInput { mute } | Command::MuteAudioOutput { mute } => {
                put_bool(dst, *mute)
            }
            Command::StartRecording { output_path } => {
                put_string(dst, &path_to_wire(output_path))?
            }
            Command::StopRecording { force } | Command::StopStreaming { force } => {
                put_bool(dst, *force)
            }
            Command::StartStreaming { server, key } => {
                put_string(dst, server)?;
                put_string(dst, key)?;
            }
            Command::LogStreamStats => {}
        }
        Ok(())
    }

    fn decode_payload(tag: Tag, r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let command = match tag {
            Tag::Init => Command::Init {
                config_path: PathBuf::from(r.string("init.config_path")?),
                title: r.string("init.title")?,
                screen_size: Size::read(r)?,
                crop_rect: Rect::read(r)?,
            },
            Tag::ScaleVideo => Command::ScaleVideo {
                size: Size::read(r)?,
            },
            Tag::CropVideo => Command::CropVideo {
                rect: Rect::read(r)?,
            },
            Tag::UpdateVideoConfig => Command::UpdateVideoConfig {
                cursor: r.bool("video.cursor")?,
                compatibility: r.bool("video.compatibility")?,
            },
            Tag::ResetAudioInput => Command::ResetAudioInput {
                device_id: r.string("audio.device_id")?,
                device_desc: r.string("audio.device_desc")?,
            },
            Tag::ResetAudioOutput => Command::ResetAudioOutput {
                device_id: r.string("audio.device_id")?,
                device_desc: r.string("audio.device_desc")?,
            },
            Tag::DownmixMonoInput => Command::DownmixMonoInput {
                enable: r.bool("downmix.enable")?,
            },
            Tag::DownmixMonoOutput => Command::DownmixMonoOutput {
                enable: r.bool("downmix.enable")?,
            },
            Tag::MuteAudioInput => Command::MuteAudioInput {
                mute: r.bool("mute")?,
            },
            Tag::MuteAudioOutput => Command::MuteAudioOutput {
                mute: r.bool("mute")?,
            },
            Tag::StartRecording => Command::StartRecording {
                output_path: PathBuf::from(r.string("recording.output_path")?),
            },
            Tag::StopRecording => Command::StopRecording {
                force: r.bool("recording.force")?,
            },
            Tag::StartStreaming => Command::StartStreaming {
                server: r.string("streaming.server")?,
                key: r.string("streaming.key")?,
            },
            Tag::StopStreaming => Command::StopStreaming {
                force: r.bool("streaming.force")?,
            },
            Tag::LogStreamStats => Command::LogStreamStats,
            other => {
                return Err(ProtocolError::UnexpectedTag {
                    tag: other as u8,
                    direction: Self::DIRECTION,
                });
            }
        };
        Ok(command)
    }
}

// ── Event ────────────────────────────────────────────────────────

/// Status notifications the worker reports back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Initialized,
    RecordingStarted,
    RecordingStopped { path: PathBuf },
    StreamingStarted,
    StreamingStopped,
    ErrorOccurred { kind: ErrorKind, message: String },
}

impl Event {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Event::ErrorOccurred {
            kind,
            message: message.into(),
        }
    }
}

impl Message for Event {
    const DIRECTION: &'static str = "event";

    fn tag(&self) -> Tag {
        match self {
            Event::Initialized => Tag::Initialized,
            Event::RecordingStarted => Tag::RecordingStarted,
            Event::RecordingStopped { .. } => Tag::RecordingStopped,
            Event::StreamingStarted => Tag::StreamingStarted,
            Event::StreamingStopped => Tag::StreamingStopped,
            Event::ErrorOccurred { .. } => Tag::ErrorOccurred,
        }
    }

    fn encode_payload(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            Event::RecordingStopped { path } => put_string(dst, &path_to_wire(path))?,
            Event::ErrorOccurred { kind, message } => {
                dst.put_u8(*kind as u8);
                put_string(dst, message)?;
            }
            Event::Initialized
            | Event::RecordingStarted
            | Event::StreamingStarted
            | Event::StreamingStopped => {}
        }
        Ok(())
    }

    fn decode_payload(tag: Tag, r: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let event = match tag {
            Tag::Initialized => Event::Initialized,
            Tag::RecordingStarted => Event::RecordingStarted,
            Tag::RecordingStopped => Event::RecordingStopped {
                path: PathBuf::from(r.string("event.path")?),
            },
            Tag::StreamingStarted => Event::StreamingStarted,
            Tag::StreamingStopped => Event::StreamingStopped,
            Tag::ErrorOccurred => Event::ErrorOccurred {
                kind: ErrorKind::try_from(r.u8("event.kind")?)?,
                message: r.string("event.message")?,
            },
            other => {
                return Err(ProtocolError::UnexpectedTag {
                    tag: other as u8,
                    direction: Self::DIRECTION,
                });
            }
        };
        Ok(event)
    }
}
