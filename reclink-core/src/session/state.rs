//! Session lifecycle and per-output phases.
//!
//! Both are small state machines with validated transitions that
//! return `Result` instead of panicking. The public [`SessionState`] is
//! never stored; it is derived from one [`Lifecycle`] and two
//! [`OutputPhase`]s.

use std::fmt;

use crate::error::ReclinkError;

// ── Lifecycle ────────────────────────────────────────────────────

/// Engine lifecycle of one session.
///
/// ```text
///  Uninitialized ──► Initializing ──► Ready
///        ▲                 │            │
///        └─────────────────┘            ▼
///                                    Released
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    /// The engine was released; terminal.
    Released,
}

impl Lifecycle {
    /// Valid from: `Uninitialized`.
    pub fn begin_init(&mut self) -> Result<(), ReclinkError> {
        match self {
            Self::Uninitialized => {
                *self = Self::Initializing;
                Ok(())
            }
            _ => Err(ReclinkError::InvalidTransition(
                "cannot initialize: session already initialized",
            )),
        }
    }

    /// Valid from: `Initializing`.
    pub fn complete_init(&mut self) -> Result<(), ReclinkError> {
        match self {
            Self::Initializing => {
                *self = Self::Ready;
                Ok(())
            }
            _ => Err(ReclinkError::InvalidTransition(
                "cannot complete init: not initializing",
            )),
        }
    }

    /// Back to `Uninitialized` so a fresh `Init` is accepted.
    ///
    /// Valid from: `Initializing`.
    pub fn fail_init(&mut self) -> Result<(), ReclinkError> {
        match self {
            Self::Initializing => {
                *self = Self::Uninitialized;
                Ok(())
            }
            _ => Err(ReclinkError::InvalidTransition(
                "cannot fail init: not initializing",
            )),
        }
    }

    /// Valid from any state.
    pub fn release(&mut self) {
        *self = Self::Released;
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

// ── OutputPhase ──────────────────────────────────────────────────

/// Where one output (recording or stream) is in its start/stop cycle.
///
/// ```text
///  Idle ──► Starting ──► Active ──► Stopping ──► Idle
///    ▲         │  │                    ▲
///    └─────────┘  └────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputPhase {
    #[default]
    Idle,
    /// Start issued, waiting for the engine's started signal.
    Starting,
    Active,
    /// Stop issued, waiting for the engine's stopped signal.
    Stopping,
}

impl OutputPhase {
    /// Valid from: `Idle`.
    pub fn begin_start(&mut self) -> Result<(), ReclinkError> {
        match self {
            Self::Idle => {
                *self = Self::Starting;
                Ok(())
            }
            _ => Err(ReclinkError::InvalidTransition("cannot start: output not idle")),
        }
    }

    /// The engine refused the start. Valid from: `Starting`.
    pub fn abort_start(&mut self) -> Result<(), ReclinkError> {
        match self {
            Self::Starting => {
                *self = Self::Idle;
                Ok(())
            }
            _ => Err(ReclinkError::InvalidTransition(
                "cannot abort start: output not starting",
            )),
        }
    }

    /// Valid from: `Starting`.
    pub fn mark_active(&mut self) -> Result<(), ReclinkError> {
        match self {
            Self::Starting => {
                *self = Self::Active;
                Ok(())
            }
            _ => Err(ReclinkError::InvalidTransition(
                "cannot activate: output not starting",
            )),
        }
    }

    /// Valid from: `Starting`, `Active`.
    pub fn begin_stop(&mut self) -> Result<(), ReclinkError> {
        match self {
            Self::Starting | Self::Active => {
                *self = Self::Stopping;
                Ok(())
            }
            _ => Err(ReclinkError::InvalidTransition(
                "cannot stop: output not running",
            )),
        }
    }

    /// The engine reported the output stopped. Valid from any phase but
    /// `Idle`; an output can die on its own while `Active`.
    pub fn finish_stop(&mut self) -> Result<(), ReclinkError> {
        match self {
            Self::Idle => Err(ReclinkError::InvalidTransition(
                "cannot finish stop: output already idle",
            )),
            _ => {
                *self = Self::Idle;
                Ok(())
            }
        }
    }

    /// `Starting` or `Active`.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Starting | Self::Active)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for OutputPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── SessionState ─────────────────────────────────────────────────

/// Externally visible state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Recording,
    Streaming,
    RecordingAndStreaming,
}

impl SessionState {
    /// An output only counts once it is `Active`.
    pub fn derive(lifecycle: Lifecycle, recording: OutputPhase, streaming: OutputPhase) -> Self {
        match lifecycle {
            Lifecycle::Uninitialized | Lifecycle::Released => Self::Uninitialized,
            Lifecycle::Initializing => Self::Initializing,
            Lifecycle::Ready => match (recording.is_active(), streaming.is_active()) {
                (true, true) => Self::RecordingAndStreaming,
                (true, false) => Self::Recording,
                (false, true) => Self::Streaming,
                (false, false) => Self::Ready,
            },
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording | Self::RecordingAndStreaming)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming | Self::RecordingAndStreaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_happy_path() {
        let mut l = Lifecycle::default();
        l.begin_init().unwrap();
        assert_eq!(l, Lifecycle::Initializing);
        l.complete_init().unwrap();
        assert!(l.is_ready());
        l.release();
        assert_eq!(l, Lifecycle::Released);
    }

    #[test]
    fn failed_init_allows_retry() {
        let mut l = Lifecycle::default();
        l.begin_init().unwrap();
        l.fail_init().unwrap();
        assert_eq!(l, Lifecycle::Uninitialized);
        l.begin_init().unwrap();
    }

    #[test]
    fn double_init_rejected() {
        let mut l = Lifecycle::Initializing;
        assert!(l.begin_init().is_err());
        let mut l = Lifecycle::Ready;
        assert!(l.begin_init().is_err());
        assert_eq!(l, Lifecycle::Ready);
    }

    #[test]
    fn output_cycle() {
        let mut p = OutputPhase::default();
        p.begin_start().unwrap();
        assert!(p.is_running());
        p.mark_active().unwrap();
        p.begin_stop().unwrap();
        assert_eq!(p, OutputPhase::Stopping);
        p.finish_stop().unwrap();
        assert!(p.is_idle());
    }

    #[test]
    fn output_guards() {
        let mut p = OutputPhase::Active;
        assert!(p.begin_start().is_err());
        let mut p = OutputPhase::Stopping;
        assert!(p.begin_stop().is_err());
        assert!(p.mark_active().is_err());
        let mut p = OutputPhase::Idle;
        assert!(p.finish_stop().is_err());
        assert!(p.begin_stop().is_err());
    }

    #[test]
    fn output_can_die_while_active() {
        let mut p = OutputPhase::Active;
        p.finish_stop().unwrap();
        assert!(p.is_idle());
    }

    #[test]
    fn derived_state() {
        use OutputPhase::*;
        let ready = Lifecycle::Ready;
        assert_eq!(SessionState::derive(ready, Idle, Idle), SessionState::Ready);
        assert_eq!(SessionState::derive(ready, Starting, Idle), SessionState::Ready);
        assert_eq!(SessionState::derive(ready, Active, Idle), SessionState::Recording);
        assert_eq!(SessionState::derive(ready, Stopping, Active), SessionState::Streaming);
        assert_eq!(
            SessionState::derive(ready, Active, Active),
            SessionState::RecordingAndStreaming
        );
        assert_eq!(
            SessionState::derive(Lifecycle::Released, Active, Active),
            SessionState::Uninitialized
        );
        assert_eq!(
            SessionState::derive(Lifecycle::Initializing, Idle, Idle),
            SessionState::Initializing
        );
    }
}
