use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::{HostCodec, WorkerCodec};
use crate::error::ReclinkError;
use crate::message::{Command, Event};
use crate::reporter::run_writer;
use crate::worker::{WorkerMessage, WorkerSender};

/// Background tasks serving one worker-side connection.
pub struct ConnectionTasks {
    /// Finishes when the peer goes away; yields the number of commands
    /// forwarded.
    pub reader: JoinHandle<u64>,
    /// Finishes once every reporter is dropped or a write fails; yields
    /// the number of events written.
    pub writer: JoinHandle<u64>,
}

/// Split `stream` into a reader task feeding `inbox` and a writer task
/// draining `events`.
///
/// When the stream ends (EOF or I/O error) the reader posts
/// [`WorkerMessage::Disconnect`] so the worker runs its shutdown.
pub fn serve<S>(stream: S, inbox: WorkerSender, events: mpsc::UnboundedReceiver<Event>) -> ConnectionTasks
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (net_writer, mut net_reader) = Framed::new(stream, WorkerCodec::new()).split();

    // Worker -> Network
    let writer = tokio::spawn(run_writer(net_writer, events));

    // Network -> Worker
    let reader = tokio::spawn(async move {
        let mut forwarded = 0u64;
        while let Some(result) = net_reader.next().await {
            match result {
                Ok(command) => {
                    if inbox.send(WorkerMessage::Command(command)).is_err() {
                        debug!("worker inbox closed, reader stopping");
                        break;
                    }
                    forwarded += 1;
                }
                Err(e) => {
                    warn!(error = %e, "channel read error");
                    break;
                }
            }
        }
        info!(forwarded, "channel closed by peer");
        if inbox.send(WorkerMessage::Disconnect).is_err() {
            debug!("worker already gone");
        }
        forwarded
    });

    ConnectionTasks { reader, writer }
}

// ── HostConnection ───────────────────────────────────────────────

/// The host application's end of the channel: sends commands, receives
/// events. Used by tooling and tests.
#[derive(Debug)]
pub struct HostConnection {
    // Channel to send commands to the background writer task
    tx: mpsc::Sender<Command>,
    // Channel to receive events from the background reader task
    rx: mpsc::Receiver<Event>,
}

impl HostConnection {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut net_writer, mut net_reader) = Framed::new(stream, HostCodec::new()).split();

        // User -> Network
        let (user_tx, mut network_rx) = mpsc::channel::<Command>(100);

        // Network -> User
        let (network_tx, user_rx) = mpsc::channel(100);

        tokio::spawn(async move {
            while let Some(command) = network_rx.recv().await {
                if let Err(e) = net_writer.send(command).await {
                    warn!(error = %e, "host write error");
                    break;
                }
            }
            let _ = net_writer.close().await;
        });

        tokio::spawn(async move {
            while let Some(result) = net_reader.next().await {
                match result {
                    Ok(event) => {
                        if network_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "host read error");
                        break;
                    }
                }
            }
        });

        Self {
            tx: user_tx,
            rx: user_rx,
        }
    }

    pub async fn send(&self, command: Command) -> Result<(), ReclinkError> {
        self.tx.send(command).await?;
        Ok(())
    }

    /// `None` once the worker closed the channel.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Stop sending; the worker sees EOF once queued commands are
    /// flushed. Events can still be received.
    pub fn close_write(&mut self) {
        let (closed, _) = mpsc::channel(1);
        self.tx = closed;
    }

    #[cfg(unix)]
    pub async fn connect(path: impl AsRef<std::path::Path>) -> Result<Self, ReclinkError> {
        let stream = tokio::net::UnixStream::connect(path).await?;
        Ok(Self::new(stream))
    }
}
