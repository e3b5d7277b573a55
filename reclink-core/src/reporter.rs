//! Event reporter: the only writer on the channel.
//!
//! Any context (the worker thread included) reports through a cloneable
//! [`EventReporter`]. A single writer task owns the sink and writes one
//! whole frame per event, so frames never interleave.

use futures::{Sink, SinkExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ReclinkError;
use crate::message::{ErrorKind, Event, Message};

/// Cloneable handle for queueing events.
#[derive(Debug, Clone)]
pub struct EventReporter {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventReporter {
    /// A reporter and the receiving end its writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue `event`. Never blocks; fails only once the writer is gone.
    pub fn report(&self, event: Event) -> Result<(), ReclinkError> {
        self.tx.send(event)?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drain `events` into `sink` until every reporter is dropped or a write
/// fails. An event too large to encode is replaced by a client error.
/// Returns the number of frames written.
pub async fn run_writer<S>(mut sink: S, mut events: mpsc::UnboundedReceiver<Event>) -> u64
where
    S: Sink<Event, Error = ReclinkError> + Unpin,
{
    let mut written = 0;
    while let Some(event) = events.recv().await {
        let tag = event.tag();
        if let Err(e) = sink.send(event).await {
            match e {
                ReclinkError::Protocol(p) => {
                    // Only this frame is lost; tell the host in its place.
                    warn!(?tag, error = %p, "event could not be encoded");
                    let notice =
                        Event::error(ErrorKind::Client, format!("{tag:?} event dropped: {p}"));
                    match sink.send(notice).await {
                        Ok(()) => written += 1,
                        Err(ReclinkError::Protocol(_)) => {}
                        Err(other) => {
                            warn!(error = %other, "event write failed, writer stopping");
                            break;
                        }
                    }
                    continue;
                }
                other => {
                    warn!(error = %other, "event write failed, writer stopping");
                    break;
                }
            }
        }
        written += 1;
    }
    let _ = sink.close().await;
    debug!(written, "event writer finished");
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{HostCodec, WorkerCodec};
    use futures::StreamExt;
    use std::path::PathBuf;
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[tokio::test]
    async fn writes_events_in_order() {
        let (client, server) = tokio::io::duplex(1024);
        let (reporter, rx) = EventReporter::channel();
        let writer = tokio::spawn(run_writer(FramedWrite::new(server, WorkerCodec::new()), rx));

        reporter.report(Event::Initialized).unwrap();
        reporter.report(Event::RecordingStarted).unwrap();
        reporter
            .report(Event::RecordingStopped {
                path: PathBuf::from("/tmp/a.mp4"),
            })
            .unwrap();
        drop(reporter);

        let mut host = FramedRead::new(client, HostCodec::new());
        assert_eq!(host.next().await.unwrap().unwrap(), Event::Initialized);
        assert_eq!(host.next().await.unwrap().unwrap(), Event::RecordingStarted);
        assert_eq!(
            host.next().await.unwrap().unwrap(),
            Event::RecordingStopped {
                path: PathBuf::from("/tmp/a.mp4")
            }
        );
        assert_eq!(writer.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn oversized_event_is_replaced_by_client_error() {
        let (client, server) = tokio::io::duplex(1024);
        let (reporter, rx) = EventReporter::channel();
        let writer = tokio::spawn(run_writer(FramedWrite::new(server, WorkerCodec::new()), rx));

        reporter
            .report(Event::RecordingStopped {
                path: PathBuf::from(format!("/tmp/{}.mp4", "x".repeat(70_000))),
            })
            .unwrap();
        reporter.report(Event::StreamingStopped).unwrap();
        drop(reporter);

        let mut host = FramedRead::new(client, HostCodec::new());
        match host.next().await.unwrap().unwrap() {
            Event::ErrorOccurred { kind, message } => {
                assert_eq!(kind, ErrorKind::Client);
                assert!(message.starts_with("RecordingStopped event dropped"), "{message}");
            }
            other => panic!("expected a client error, got {other:?}"),
        }
        assert_eq!(host.next().await.unwrap().unwrap(), Event::StreamingStopped);
        assert_eq!(writer.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn report_fails_after_writer_is_gone() {
        let (reporter, rx) = EventReporter::channel();
        drop(rx);
        assert!(reporter.is_closed());
        assert!(matches!(
            reporter.report(Event::Initialized),
            Err(ReclinkError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn reporter_works_from_a_plain_thread() {
        let (client, server) = tokio::io::duplex(1024);
        let (reporter, rx) = EventReporter::channel();
        let writer = tokio::spawn(run_writer(FramedWrite::new(server, WorkerCodec::new()), rx));

        std::thread::spawn(move || {
            reporter.report(Event::StreamingStarted).unwrap();
        })
        .join()
        .unwrap();

        let mut host = FramedRead::new(client, HostCodec::new());
        assert_eq!(host.next().await.unwrap().unwrap(), Event::StreamingStarted);
        assert_eq!(writer.await.unwrap(), 1);
    }
}
