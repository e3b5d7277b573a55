//! Channel plumbing: opening the local socket and running the reader
//! and writer tasks over it.
//!
//! Exactly one peer is served. When listening, later connection
//! attempts are accepted and closed straight away with a warning.

pub mod connection;

pub use connection::{ConnectionTasks, HostConnection, serve};

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ReclinkError;

/// Default socket location.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/reclink.sock";

/// Which side of the socket the worker takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelRole {
    /// Bind the socket and serve the first client.
    #[default]
    Listen,
    /// Dial a host that is already listening.
    Connect,
}

impl FromStr for ChannelRole {
    type Err = ReclinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listen" => Ok(Self::Listen),
            "connect" => Ok(Self::Connect),
            other => Err(ReclinkError::Other(format!(
                "unknown channel role '{other}' (expected 'listen' or 'connect')"
            ))),
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listen => f.write_str("listen"),
            Self::Connect => f.write_str("connect"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEndpoint {
    pub socket_path: PathBuf,
    pub role: ChannelRole,
}

impl ChannelEndpoint {
    pub fn new(socket_path: impl Into<PathBuf>, role: ChannelRole) -> Self {
        Self {
            socket_path: socket_path.into(),
            role,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Default for ChannelEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_SOCKET_PATH, ChannelRole::Listen)
    }
}

impl fmt::Display for ChannelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.socket_path.display(), self.role)
    }
}

#[cfg(unix)]
pub use unix::{OpenChannel, open_channel, reject_extra_clients};

#[cfg(unix)]
mod unix {
    use std::io;

    use tokio::net::{UnixListener, UnixStream};
    use tokio::task::JoinHandle;
    use tracing::{info, warn};

    use super::{ChannelEndpoint, ChannelRole};
    use crate::error::ReclinkError;

    /// A connected channel plus, when listening, the task turning away
    /// extra clients.
    pub struct OpenChannel {
        pub stream: UnixStream,
        pub rejector: Option<JoinHandle<()>>,
    }

    /// Open the channel and wait for the peer.
    pub async fn open_channel(endpoint: &ChannelEndpoint) -> Result<OpenChannel, ReclinkError> {
        match endpoint.role {
            ChannelRole::Connect => {
                info!(socket = %endpoint.socket_path.display(), "connecting to host");
                let stream = UnixStream::connect(&endpoint.socket_path).await?;
                Ok(OpenChannel {
                    stream,
                    rejector: None,
                })
            }
            ChannelRole::Listen => {
                match std::fs::remove_file(&endpoint.socket_path) {
                    Ok(()) => info!(socket = %endpoint.socket_path.display(), "removed stale socket"),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                let listener = UnixListener::bind(&endpoint.socket_path)?;
                info!(socket = %endpoint.socket_path.display(), "waiting for host");
                let (stream, _) = listener.accept().await?;
                info!("host connected");
                Ok(OpenChannel {
                    stream,
                    rejector: Some(reject_extra_clients(listener)),
                })
            }
        }
    }

    /// Accept and immediately close every further connection.
    pub fn reject_extra_clients(listener: UnixListener) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        warn!("{}, closing new connection", ReclinkError::AlreadyConnected);
                        drop(stream);
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed, no longer rejecting clients");
                        break;
                    }
                }
            }
        })
    }
}
