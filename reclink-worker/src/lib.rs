//! # reclink-worker: Recording/Streaming Session Worker
//!
//! Out-of-process helper that a host application drives over a local
//! socket. It owns one capture session: the host sends framed commands
//! (initialize, scale, crop, audio routing, start/stop recording and
//! streaming) and receives lifecycle events back.
//!
//! ## Lifecycle
//!
//! - **Open**: bind (or dial) the socket and wait for the host.
//! - **Serve**: one worker thread runs the session; reader and writer
//!   tasks move frames in and out.
//! - **Disconnect**: when the host hangs up, running outputs are
//!   stopped, the engine is released and the process exits with 0.

pub mod config;
pub mod logging;
pub mod service;
