//! Physical socket primitive supplied by the host.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::Result;

/// Close codes used by the session.
pub struct CloseCode;

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Peer going away.
    pub const GOING_AWAY: u16 = 1001;
    /// No status code was present in the close frame.
    pub const NO_STATUS: u16 = 1005;
    /// Connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;
    /// Server hit an internal error.
    pub const INTERNAL_ERROR: u16 = 1011;
    /// Server is restarting.
    pub const SERVICE_RESTART: u16 = 1012;
    /// Server is overloaded, try again later.
    pub const TRY_AGAIN_LATER: u16 = 1013;
    /// Reserved: the session is restarting the connection.
    pub const RESTART: u16 = 4000;
    /// Reserved: planned shutdown.
    pub const SHUTDOWN: u16 = 4001;
}

/// Failure reported by a physical socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// The HTTP upgrade was refused with the given status.
    Upgrade { status: u16 },
    /// Any other I/O or protocol failure.
    Io(String),
}

impl std::fmt::Display for SocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upgrade { status } => write!(f, "upgrade refused with status {status}"),
            Self::Io(message) => write!(f, "{message}"),
        }
    }
}

/// Events emitted by a physical socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Message(Bytes),
    Pong,
    Error(SocketError),
    Close { code: u16, reason: String },
}

/// A single physical connection.
#[async_trait]
pub trait Socket: Send {
    /// Send a data frame.
    async fn send(&mut self, data: Bytes) -> Result<()>;

    /// Send a protocol-level ping.
    async fn ping(&mut self) -> Result<()>;

    /// Start a graceful close. The socket emits [`SocketEvent::Close`] once
    /// the close completes.
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;

    /// Abort the connection immediately, including one still connecting.
    fn terminate(&mut self);
}

/// Opens physical connections.
pub trait Connector: Send + Sync + 'static {
    type Socket: Socket + 'static;

    /// Start connecting to `url`. Returns without waiting for the connection;
    /// progress is reported on `events`.
    fn connect(&self, url: &str, events: UnboundedSender<SocketEvent>) -> Self::Socket;
}
