//! # reclink-core
//!
//! Core library of the reclink recording/streaming worker.
//!
//! This crate contains:
//! - **Wire protocol**: `Command`, `Event`, `Tag` and the `[u16 len][u8 tag][payload]` framing
//! - **Codec**: `WorkerCodec` / `HostCodec` for framed I/O via `tokio_util`
//! - **Resolution**: output size planning and source letterboxing
//! - **Engine**: the `EngineAdapter` contract and the in-process `LoopbackEngine`
//! - **Session**: `SessionController` and its lifecycle / output state machines
//! - **Stats**: bitrate and dropped-frame sampling for live streams
//! - **Reporter**: `EventReporter`, the single writer on the channel
//! - **Network**: local socket setup and the reader/writer tasks
//! - **Worker**: the dedicated thread that owns the controller and engine
//! - **Error**: `ReclinkError`, a typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod engine;
pub mod error;
pub mod frame;
pub mod message;
pub mod network;
pub mod reporter;
pub mod resolution;
pub mod session;
pub mod stats;
pub mod wire;
pub mod worker;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{FrameCodec, HostCodec, WorkerCodec};
pub use engine::{
    AudioDevice, AudioDeviceKind, EngineAdapter, EngineCall, EngineEventSink, EngineSignal,
    InitRequest, LoopbackEngine, LoopbackProbe, StreamStats,
};
pub use error::{EngineError, OutputFailure, ProtocolError, ReclinkError};
pub use frame::{Decoded, MAX_PAYLOAD_SIZE, decode_next, encode_frame};
pub use message::{Command, ErrorKind, Event, Message, Rect, Size, Tag};
pub use network::{ChannelEndpoint, ChannelRole, ConnectionTasks, HostConnection, serve};
pub use reporter::EventReporter;
pub use resolution::{Resolution, SourceFit, fit_source, plan_resolution};
pub use session::{OutputPhase, SessionConfig, SessionController, SessionState};
pub use stats::{StreamSample, StreamStatsSampler};
pub use worker::{SignalForwarder, WorkerHandle, WorkerMessage, WorkerSummary, spawn_worker};
