//! Worker service run loop.
//!
//! Opens the channel, starts the worker thread and the reader/writer
//! tasks, then waits for the host to hang up (or a stop request) and
//! drives the bounded shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use reclink_core::{
    EngineAdapter, EventReporter, LoopbackEngine, ReclinkError, WorkerSummary, serve, spawn_worker,
};

use crate::config::{EngineConfig, WorkerConfig};

/// Build the media engine named by the `engine` section.
pub fn build_engine(config: &EngineConfig) -> Result<Box<dyn EngineAdapter>, ReclinkError> {
    match config.kind.as_str() {
        "loopback" => Ok(Box::new(LoopbackEngine::with_stats_rate(
            config.stats_bytes_per_tick,
            config.stats_frames_per_tick,
        ))),
        other => Err(ReclinkError::Other(format!("unknown engine kind '{other}'"))),
    }
}

// ── WorkerService ────────────────────────────────────────────────

/// Serves one host connection from open to disconnect.
pub struct WorkerService {
    config: WorkerConfig,
    running: Arc<AtomicBool>,
}

impl WorkerService {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Open the configured channel and serve it until the host hangs up.
    #[cfg(unix)]
    pub async fn run(&self) -> Result<WorkerSummary, ReclinkError> {
        use reclink_core::network::open_channel;

        self.running.store(true, Ordering::SeqCst);
        let endpoint = self.config.endpoint()?;
        info!(%endpoint, "opening channel");

        let channel = tokio::select! {
            result = open_channel(&endpoint) => result?,
            _ = Self::wait_for_stop(&self.running) => {
                info!("stopped before a host connected");
                return Ok(WorkerSummary::default());
            }
        };

        let result = self.serve_stream(channel.stream).await;
        if let Some(rejector) = channel.rejector {
            rejector.abort();
        }
        self.running.store(false, Ordering::SeqCst);
        result
    }

    #[cfg(not(unix))]
    pub async fn run(&self) -> Result<WorkerSummary, ReclinkError> {
        Err(ReclinkError::Other(
            "local socket channel is only available on Unix platforms".into(),
        ))
    }

    /// Serve an already connected stream.
    pub async fn serve_stream<S>(&self, stream: S) -> Result<WorkerSummary, ReclinkError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.running.store(true, Ordering::SeqCst);
        let grace = self.config.shutdown_grace();

        let engine = build_engine(&self.config.engine)?;
        let (reporter, events) = EventReporter::channel();
        let worker = spawn_worker(engine, reporter, self.config.session.record_when_streaming)?;
        let mut tasks = serve(stream, worker.sender(), events);

        tokio::select! {
            result = &mut tasks.reader => match result {
                Ok(commands) => info!(commands, "host disconnected"),
                Err(e) => warn!(error = %e, "reader task failed"),
            },
            _ = Self::wait_for_stop(&self.running) => {
                info!("stop requested, disconnecting");
                worker.disconnect();
                tasks.reader.abort();
            }
        }

        // A worker stuck past the grace period still ends as a disconnect.
        let summary = match worker.wait(grace).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "forcing shutdown");
                WorkerSummary {
                    disconnected: true,
                    ..WorkerSummary::default()
                }
            }
        };

        match tokio::time::timeout(grace, &mut tasks.writer).await {
            Ok(Ok(events)) => debug!(events, "writer drained"),
            Ok(Err(e)) => warn!(error = %e, "writer task failed"),
            Err(_) => {
                warn!("writer did not drain in time");
                tasks.writer.abort();
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(
            commands = summary.commands,
            signals = summary.signals,
            "worker service stopped"
        );
        Ok(summary)
    }

    // ── Internal ─────────────────────────────────────────────────

    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use reclink_core::{Command, Event, HostConnection, Rect, Size};

    use super::*;

    fn init() -> Command {
        Command::Init {
            config_path: PathBuf::from("/var/lib/reclink"),
            title: "Lesson".into(),
            screen_size: Size::new(1280, 720),
            crop_rect: Rect::new(0, 0, 1280, 720),
        }
    }

    #[test]
    fn unknown_engine_kind() {
        let config = EngineConfig {
            kind: "obs".into(),
            ..EngineConfig::default()
        };
        assert!(build_engine(&config).is_err());
        assert!(build_engine(&EngineConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn serves_until_host_hangs_up() {
        let (host_side, worker_side) = tokio::io::duplex(4096);
        let service = Arc::new(WorkerService::new(WorkerConfig::default()));
        let svc = Arc::clone(&service);
        let run = tokio::spawn(async move { svc.serve_stream(worker_side).await });

        let mut host = HostConnection::new(host_side);
        host.send(init()).await.unwrap();
        assert_eq!(host.recv().await, Some(Event::Initialized));
        host.close_write();

        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(summary.disconnected);
        assert_eq!(summary.commands, 1);
        assert!(!service.is_running());
        // worker gone, channel closed
        assert_eq!(host.recv().await, None);
    }

    #[tokio::test]
    async fn stop_handle_disconnects() {
        let (host_side, worker_side) = tokio::io::duplex(4096);
        let service = Arc::new(WorkerService::new(WorkerConfig::default()));
        let svc = Arc::clone(&service);
        let run = tokio::spawn(async move { svc.serve_stream(worker_side).await });

        let mut host = HostConnection::new(host_side);
        host.send(init()).await.unwrap();
        assert_eq!(host.recv().await, Some(Event::Initialized));

        service.stop();
        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(summary.disconnected);
    }
}
