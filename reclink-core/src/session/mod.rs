//! Session state: the controller, its state machines and output config.

pub mod config;
pub mod controller;
pub mod state;

pub use config::{STREAM_RETRY_INTERVAL, STREAM_RETRY_LIMIT, SessionConfig};
pub use controller::SessionController;
pub use state::{Lifecycle, OutputPhase, SessionState};
