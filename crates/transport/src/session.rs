//! Reconnecting session over a physical socket.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::socket::{CloseCode, Connector, Socket, SocketError, SocketEvent};

const RESTART_REASON: &str = "restarting";

/// Shortest timer period; tokio intervals reject zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Session tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Restart when no message or pong arrives within this window. Pings are
    /// sent at half this interval.
    pub stall_threshold: Duration,

    /// How often the stall check runs.
    pub health_interval: Duration,

    /// Restart delay used when the handler does not supply one.
    pub restart_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            stall_threshold: Duration::from_millis(2000),
            health_interval: Duration::from_millis(100),
            restart_delay: Duration::from_millis(500),
        }
    }
}

/// Owner callbacks for session events.
#[async_trait]
pub trait Handler: Send + 'static {
    /// Called each time a physical connection opens. A returned payload is
    /// sent on the new connection.
    async fn on_open(&mut self) -> Option<Bytes> {
        None
    }

    /// Called for every inbound data frame.
    async fn on_message(&mut self, data: Bytes);

    /// Called when the physical connection closes. `Ok` restarts after the
    /// returned delay (or the default); `Err` ends the session with that
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error when the close code should be treated as fatal.
    async fn on_close(&mut self, code: u16, reason: &str) -> Result<Option<Duration>>;

    /// Called when the physical socket reports an error. Returns an optional
    /// restart delay.
    async fn on_error(&mut self, _error: &SocketError) -> Option<Duration> {
        None
    }
}

#[derive(Debug)]
enum Command {
    Send(Bytes),
    Terminate { code: u16, reason: String },
}

/// Handle to a running session.
///
/// Dropping the handle terminates the session.
#[derive(Debug)]
pub struct Transport {
    commands: UnboundedSender<Command>,
    task: Option<JoinHandle<Result<()>>>,
}

impl Transport {
    /// Start a session for `url`. Returns immediately; the first connection
    /// is opened by the session task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<C, H>(url: impl Into<String>, connector: C, handler: H, options: Options) -> Self
    where
        C: Connector,
        H: Handler,
    {
        let (commands, rx) = mpsc::unbounded_channel();
        let session = Session {
            url: url.into(),
            connector,
            handler,
            options,
            commands: rx,
            socket: None,
            events: None,
            phase: Phase::Closed,
            last_receive: Instant::now(),
            pending_restart: None,
        };
        let task = tokio::spawn(session.run());

        Self { commands, task: Some(task) }
    }

    /// Permanently end the session. Safe to call more than once and after
    /// the session has already ended.
    pub fn terminate(&self, code: u16, reason: Option<&str>) {
        let reason = reason.unwrap_or_default().to_string();
        if self.commands.send(Command::Terminate { code, reason }).is_err() {
            debug!("session already ended");
        }
    }

    /// Send a data frame on the current connection. Frames sent while no
    /// connection is open are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error when the session has ended.
    pub fn send(&self, data: Bytes) -> Result<()> {
        self.commands
            .send(Command::Send(data))
            .map_err(|e| Error::Socket(format!("session has ended: {e}")))
    }

    /// Wait for the session to end.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the session, or [`Error::Socket`] when
    /// the session task failed.
    pub async fn closed(&mut self) -> Result<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = task.await;
        self.task = None;

        result.map_err(|e| Error::Socket(format!("session task failed: {e}")))?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Open,
    Closing,
    Closed,
}

struct Session<C: Connector, H> {
    url: String,
    connector: C,
    handler: H,
    options: Options,
    commands: UnboundedReceiver<Command>,
    socket: Option<C::Socket>,
    events: Option<UnboundedReceiver<SocketEvent>>,
    phase: Phase,
    last_receive: Instant,
    pending_restart: Option<Instant>,
}

impl<C: Connector, H: Handler> Session<C, H> {
    async fn run(mut self) -> Result<()> {
        let start = Instant::now();
        let health_period = self.options.health_interval.max(MIN_PERIOD);
        let mut health = interval_at(start + health_period, health_period);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ping_period = (self.options.stall_threshold / 2).max(MIN_PERIOD);
        let mut ping = interval_at(start + ping_period, ping_period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.connect();

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Send(data)) => self.send(data).await,
                    Some(Command::Terminate { code, reason }) => {
                        self.terminate(code, &reason).await;
                        return Ok(());
                    }
                    None => {
                        self.terminate(CloseCode::SHUTDOWN, "handle dropped").await;
                        return Ok(());
                    }
                },

                event = next_event(self.events.as_mut()) => {
                    let event = event.unwrap_or_else(|| SocketEvent::Close {
                        code: CloseCode::ABNORMAL,
                        reason: "event stream ended".to_string(),
                    });
                    if let Err(e) = self.on_event(event).await {
                        error!(monotonic_counter.transport_fatal_close = 1, "session ended: {e}");
                        self.terminate(CloseCode::SHUTDOWN, "fatal close").await;
                        return Err(e);
                    }
                }

                () = wait_until(self.pending_restart) => self.reconnect(),

                _ = health.tick() => self.check_health().await,

                _ = ping.tick(), if self.phase == Phase::Open => {
                    if let Some(socket) = self.socket.as_mut()
                        && let Err(e) = socket.ping().await
                    {
                        warn!("ping failed: {e}");
                    }
                }
            }
        }
    }

    fn connect(&mut self) {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(url = %self.url, "connecting");

        self.socket = Some(self.connector.connect(&self.url, tx));
        self.events = Some(rx);
        self.phase = Phase::Connecting;
        self.last_receive = Instant::now();
    }

    fn reconnect(&mut self) {
        self.pending_restart = None;

        // a connection that has not finished closing is aborted first
        if let Some(mut socket) = self.socket.take() {
            socket.terminate();
        }
        self.events = None;

        self.connect();
    }

    async fn on_event(&mut self, event: SocketEvent) -> Result<()> {
        match event {
            SocketEvent::Open => {
                info!(url = %self.url, "connection open");
                self.phase = Phase::Open;
                self.last_receive = Instant::now();

                if let Some(greeting) = self.handler.on_open().await {
                    self.send(greeting).await;
                }
            }
            SocketEvent::Message(data) => {
                self.last_receive = Instant::now();
                self.handler.on_message(data).await;
            }
            SocketEvent::Pong => {
                self.last_receive = Instant::now();
            }
            SocketEvent::Error(err) => {
                warn!(monotonic_counter.transport_socket_error = 1, "socket error: {err}");
                let delay = self.handler.on_error(&err).await;
                self.restart(delay.unwrap_or(self.options.restart_delay)).await;
            }
            SocketEvent::Close { code, reason } => {
                debug!(code, reason, "connection closed");
                self.socket = None;
                self.events = None;
                self.phase = Phase::Closed;

                let delay = self.handler.on_close(code, &reason).await?;
                self.restart(delay.unwrap_or(self.options.restart_delay)).await;
            }
        }

        Ok(())
    }

    async fn check_health(&mut self) {
        if self.pending_restart.is_some() || !matches!(self.phase, Phase::Connecting | Phase::Open) {
            return;
        }

        let silent = self.last_receive.elapsed();
        if silent > self.options.stall_threshold {
            warn!(
                monotonic_counter.transport_stall = 1,
                silent_ms = silent.as_millis(),
                "connection stalled"
            );
            self.restart(self.options.restart_delay).await;
        }
    }

    // Only one restart may be pending at a time.
    async fn restart(&mut self, delay: Duration) {
        if self.pending_restart.is_some() {
            debug!("restart already scheduled");
            return;
        }

        match self.phase {
            Phase::Connecting => {
                // a half-open connection cannot be closed gracefully
                if let Some(mut socket) = self.socket.take() {
                    socket.terminate();
                }
                self.events = None;
                self.phase = Phase::Closed;
            }
            Phase::Open => {
                if let Some(socket) = self.socket.as_mut() {
                    match socket.close(CloseCode::RESTART, RESTART_REASON).await {
                        Ok(()) => self.phase = Phase::Closing,
                        Err(e) => {
                            warn!("graceful close failed: {e}");
                            socket.terminate();
                            self.socket = None;
                            self.events = None;
                            self.phase = Phase::Closed;
                        }
                    }
                }
            }
            Phase::Closing | Phase::Closed => {}
        }

        debug!(delay_ms = delay.as_millis(), "reconnect scheduled");
        self.pending_restart = Some(Instant::now() + delay);
    }

    async fn send(&mut self, data: Bytes) {
        match (self.phase, self.socket.as_mut()) {
            (Phase::Open, Some(socket)) => {
                if let Err(e) = socket.send(data).await {
                    warn!("send failed: {e}");
                }
            }
            _ => debug!("no open connection, dropping frame"),
        }
    }

    async fn terminate(&mut self, code: u16, reason: &str) {
        if let Some(mut socket) = self.socket.take() {
            if self.phase == Phase::Open {
                if let Err(e) = socket.close(code, reason).await {
                    warn!("close on terminate failed: {e}");
                    socket.terminate();
                }
            } else {
                socket.terminate();
            }
        }

        self.events = None;
        self.pending_restart = None;
        self.phase = Phase::Closed;
        info!(code, reason, "session terminated");
    }
}

async fn next_event(events: Option<&mut UnboundedReceiver<SocketEvent>>) -> Option<SocketEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
