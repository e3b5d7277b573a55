//! The worker context: one OS thread that owns the session controller
//! and the engine.
//!
//! Commands from the reader task and signals from the engine share one
//! ordered inbox, so the controller sees them strictly one at a time.
//! The thread ends after the disconnect sequence has run.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::engine::{EngineAdapter, EngineEventSink, EngineSignal};
use crate::error::ReclinkError;
use crate::message::Command;
use crate::reporter::EventReporter;
use crate::session::SessionController;

/// Everything the worker thread reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    Command(Command),
    Signal(EngineSignal),
    /// The channel closed; run the disconnect sequence and exit.
    Disconnect,
}

pub type WorkerSender = mpsc::UnboundedSender<WorkerMessage>;

// ── SignalForwarder ──────────────────────────────────────────────

/// Engine sink that posts every signal into the worker inbox.
pub struct SignalForwarder {
    inbox: WorkerSender,
}

impl SignalForwarder {
    pub fn new(inbox: WorkerSender) -> Self {
        Self { inbox }
    }
}

impl EngineEventSink for SignalForwarder {
    fn signal(&self, signal: EngineSignal) {
        if self.inbox.send(WorkerMessage::Signal(signal)).is_err() {
            debug!("worker gone, engine signal dropped");
        }
    }
}

// ── Worker thread ────────────────────────────────────────────────

/// What the worker thread did before it exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerSummary {
    pub commands: u64,
    pub signals: u64,
    /// `true` when the thread ended on [`WorkerMessage::Disconnect`].
    pub disconnected: bool,
}

/// Owner side of a running worker thread.
pub struct WorkerHandle {
    inbox: WorkerSender,
    thread: thread::JoinHandle<WorkerSummary>,
    done: oneshot::Receiver<()>,
}

/// Start the worker thread. The engine gets a [`SignalForwarder`] into
/// the new inbox before the controller takes ownership of it.
pub fn spawn_worker(
    mut engine: Box<dyn EngineAdapter>,
    reporter: EventReporter,
    record_when_streaming: bool,
) -> Result<WorkerHandle, ReclinkError> {
    let (inbox, rx) = mpsc::unbounded_channel();
    engine.set_event_sink(Arc::new(SignalForwarder::new(inbox.clone())));
    let (done_tx, done) = oneshot::channel();

    let thread = thread::Builder::new()
        .name("reclink-worker".into())
        .spawn(move || {
            let controller = SessionController::new(engine, reporter, record_when_streaming);
            let summary = run(controller, rx);
            let _ = done_tx.send(());
            summary
        })
        .map_err(|e| ReclinkError::Worker(format!("failed to spawn worker thread: {e}")))?;

    Ok(WorkerHandle {
        inbox,
        thread,
        done,
    })
}

fn run(mut controller: SessionController, mut inbox: mpsc::UnboundedReceiver<WorkerMessage>) -> WorkerSummary {
    info!("worker started");
    let mut summary = WorkerSummary::default();
    while let Some(message) = inbox.blocking_recv() {
        match message {
            WorkerMessage::Command(command) => {
                summary.commands += 1;
                controller.handle_command(command);
            }
            WorkerMessage::Signal(signal) => {
                summary.signals += 1;
                controller.handle_signal(signal);
            }
            WorkerMessage::Disconnect => {
                info!("channel disconnected, stopping session");
                summary.disconnected = true;
                break;
            }
        }
    }
    controller.shutdown();
    info!(
        commands = summary.commands,
        signals = summary.signals,
        "worker finished"
    );
    summary
}

impl WorkerHandle {
    /// A sender for the reader task.
    pub fn sender(&self) -> WorkerSender {
        self.inbox.clone()
    }

    pub fn send(&self, command: Command) -> Result<(), ReclinkError> {
        self.inbox.send(WorkerMessage::Command(command))?;
        Ok(())
    }

    pub fn disconnect(&self) {
        if self.inbox.send(WorkerMessage::Disconnect).is_err() {
            debug!("worker already gone");
        }
    }

    /// Wait up to `grace` for the thread to finish.
    pub async fn wait(self, grace: Duration) -> Result<WorkerSummary, ReclinkError> {
        match tokio::time::timeout(grace, self.done).await {
            Ok(_) => {}
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "worker did not stop in time");
                return Err(ReclinkError::Worker(format!(
                    "worker did not stop within {} ms",
                    grace.as_millis()
                )));
            }
        }
        let thread = self.thread;
        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|e| ReclinkError::Worker(e.to_string()))?
            .map_err(|_| ReclinkError::Worker("worker thread panicked".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCall, LoopbackEngine};
    use crate::message::{Event, Rect, Size};
    use std::path::PathBuf;

    fn init() -> Command {
        Command::Init {
            config_path: PathBuf::from("/etc/reclink"),
            title: "Lesson".into(),
            screen_size: Size::new(1920, 1080),
            crop_rect: Rect::new(0, 0, 1920, 1080),
        }
    }

    #[tokio::test]
    async fn disconnect_while_recording_stops_then_releases() {
        let engine = LoopbackEngine::new();
        let probe = engine.probe();
        let (reporter, mut events) = EventReporter::channel();
        let worker = spawn_worker(Box::new(engine), reporter, false).unwrap();

        worker.send(init()).unwrap();
        assert_eq!(events.recv().await, Some(Event::Initialized));
        worker
            .send(Command::StartRecording {
                output_path: PathBuf::from("/tmp/a.mp4"),
            })
            .unwrap();
        assert_eq!(events.recv().await, Some(Event::RecordingStarted));

        worker.disconnect();
        let summary = worker.wait(Duration::from_secs(5)).await.unwrap();
        assert!(summary.disconnected);
        assert_eq!(summary.commands, 2);

        let journal = probe.journal();
        let n = journal.len();
        assert_eq!(
            &journal[n - 2..],
            &[EngineCall::StopRecording { force: false }, EngineCall::Release]
        );
        assert_eq!(probe.count(|c| *c == EngineCall::Release), 1);
    }

    #[tokio::test]
    async fn signals_arrive_through_the_inbox() {
        let engine = LoopbackEngine::new();
        let (reporter, mut events) = EventReporter::channel();
        let worker = spawn_worker(Box::new(engine), reporter, false).unwrap();

        worker.send(init()).unwrap();
        assert_eq!(events.recv().await, Some(Event::Initialized));
        worker.disconnect();
        let summary = worker.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(summary.signals, 1);
    }

    #[tokio::test]
    async fn disconnect_before_init_only_releases() {
        let engine = LoopbackEngine::new();
        let probe = engine.probe();
        let (reporter, _events) = EventReporter::channel();
        let worker = spawn_worker(Box::new(engine), reporter, false).unwrap();

        worker.disconnect();
        worker.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(probe.journal(), vec![EngineCall::Release]);
    }
}
