//! # Provider
//!
//! Provider defines external data interfaces for the crate.

use std::any::Any;
use std::collections::HashMap;
use std::error::Error;

use anyhow::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{Request, Response};
use http_body::Body;

/// The `HttpRequest` trait defines the behavior for fetching data from a source.
pub trait HttpRequest: Send + Sync {
    /// Make outbound HTTP request.
    fn fetch<T>(&self, request: Request<T>) -> impl Future<Output = Result<Response<Bytes>>> + Send
    where
        T: Body + Any + Send,
        T::Data: Into<Vec<u8>>,
        T::Error: Into<Box<dyn Error + Send + Sync + 'static>>;
}

/// Message represents a message to be published.
#[derive(Clone, Debug)]
pub struct Message {
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl Message {
    #[must_use]
    pub fn new(payload: &[u8]) -> Self {
        Self { payload: payload.to_vec(), headers: HashMap::new() }
    }

    /// Attach a metadata header to the message.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// The `Publisher` trait defines the message publishing behavior.
pub trait Publisher: Send + Sync {
    /// Publish a message to the named topic.
    fn send(&self, topic: &str, message: &Message) -> impl Future<Output = Result<()>> + Send;
}

/// The `Clock` trait supplies wall-clock time to time-sensitive rules.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
