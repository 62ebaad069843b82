#![allow(missing_docs)]
#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use transport::{CloseCode, Connector, Error, Handler, Result, Socket, SocketError, SocketEvent};

/// Calls made on a physical socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send(Bytes),
    Ping,
    Close(u16, String),
    Terminate,
}

#[derive(Debug, Default)]
pub struct Sockets {
    pub urls: Vec<String>,
    pub events: Vec<UnboundedSender<SocketEvent>>,
    pub calls: Vec<Vec<Call>>,
}

/// Connector recording every connection it opens.
#[derive(Clone, Default)]
pub struct MockConnector {
    sockets: Arc<Mutex<Sockets>>,
    auto_pong: bool,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to every ping with a pong.
    #[must_use]
    pub fn with_auto_pong(mut self) -> Self {
        self.auto_pong = true;
        self
    }

    pub fn sockets(&self) -> MutexGuard<'_, Sockets> {
        self.sockets.lock().expect("should lock")
    }

    pub fn connects(&self) -> usize {
        self.sockets().urls.len()
    }

    pub fn calls(&self, index: usize) -> Vec<Call> {
        self.sockets().calls[index].clone()
    }

    /// Emit an event on the socket opened by connection `index`.
    pub fn emit(&self, index: usize, event: SocketEvent) {
        // the session may already have dropped this socket's receiver
        let _ = self.sockets().events[index].send(event);
    }
}

impl Connector for MockConnector {
    type Socket = MockSocket;

    fn connect(&self, url: &str, events: UnboundedSender<SocketEvent>) -> MockSocket {
        let mut sockets = self.sockets();
        let index = sockets.urls.len();
        sockets.urls.push(url.to_string());
        sockets.events.push(events.clone());
        sockets.calls.push(Vec::new());

        MockSocket { index, events, sockets: Arc::clone(&self.sockets), auto_pong: self.auto_pong }
    }
}

pub struct MockSocket {
    index: usize,
    events: UnboundedSender<SocketEvent>,
    sockets: Arc<Mutex<Sockets>>,
    auto_pong: bool,
}

impl MockSocket {
    fn record(&self, call: Call) {
        self.sockets.lock().expect("should lock").calls[self.index].push(call);
    }
}

#[async_trait]
impl Socket for MockSocket {
    async fn send(&mut self, data: Bytes) -> Result<()> {
        self.record(Call::Send(data));
        Ok(())
    }

    async fn ping(&mut self) -> Result<()> {
        self.record(Call::Ping);
        if self.auto_pong {
            let _ = self.events.send(SocketEvent::Pong);
        }
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.record(Call::Close(code, reason.to_string()));
        let _ = self.events.send(SocketEvent::Close { code, reason: reason.to_string() });
        Ok(())
    }

    fn terminate(&mut self) {
        self.record(Call::Terminate);
    }
}

/// Events observed by the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Open,
    Message(Bytes),
    Close(u16),
    Error(SocketError),
}

/// Handler that records events and treats codes in `fatal` as unexpected.
#[derive(Clone, Default)]
pub struct MockHandler {
    seen: Arc<Mutex<Vec<Seen>>>,
    greeting: Option<Bytes>,
    delay: Option<Duration>,
    fatal: Vec<u16>,
}

impl MockHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_greeting(mut self, greeting: &'static [u8]) -> Self {
        self.greeting = Some(Bytes::from_static(greeting));
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_fatal(mut self, code: u16) -> Self {
        self.fatal.push(code);
        self
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().expect("should lock").clone()
    }

    fn record(&self, seen: Seen) {
        self.seen.lock().expect("should lock").push(seen);
    }
}

#[async_trait]
impl Handler for MockHandler {
    async fn on_open(&mut self) -> Option<Bytes> {
        self.record(Seen::Open);
        self.greeting.clone()
    }

    async fn on_message(&mut self, data: Bytes) {
        self.record(Seen::Message(data));
    }

    async fn on_close(&mut self, code: u16, reason: &str) -> Result<Option<Duration>> {
        self.record(Seen::Close(code));
        if self.fatal.contains(&code) {
            return Err(Error::UnexpectedClose { code, reason: reason.to_string() });
        }
        if code == CloseCode::RESTART {
            return Ok(None);
        }
        Ok(self.delay)
    }

    async fn on_error(&mut self, error: &SocketError) -> Option<Duration> {
        self.record(Seen::Error(error.clone()));
        self.delay
    }
}
