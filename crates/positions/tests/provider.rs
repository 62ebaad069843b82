#![allow(missing_docs)]
#![allow(dead_code)]

use std::any::Any;
use std::error::Error;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use geometry::{GeoPoint, LocalProjection};
use http::{Request, Response, StatusCode};
use http_body::Body;
use positions::{Clock, HttpRequest, Message, Publisher, RouteGeometry, RouteShape, RouteTable};

pub const CENTER: GeoPoint = GeoPoint::new(-36.8485, 174.7633);
pub const ROUTE_ID: &str = "NX1-203";
pub const SHORT_NAME: &str = "NX1";

/// A route running east along 36.85S, returning west.
#[must_use]
pub fn route() -> RouteShape {
    let projection = LocalProjection::new(CENTER, 50_000.0).expect("should build");
    let outbound = [GeoPoint::new(-36.85, 174.70), GeoPoint::new(-36.85, 174.80)];
    let inbound = [GeoPoint::new(-36.85, 174.80), GeoPoint::new(-36.85, 174.70)];
    RouteShape::new(SHORT_NAME, projection, &outbound, &inbound).expect("should build")
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub uri: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct MockProvider {
    pub routes: Arc<RouteTable>,
    now: Arc<Mutex<DateTime<Utc>>>,
    published: Arc<Mutex<Vec<(String, Message)>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
    response: Arc<Mutex<(StatusCode, Bytes)>>,
    fail_publish: bool,
}

impl MockProvider {
    #[must_use]
    pub fn new(now: i64) -> Self {
        let routes = RouteTable::new();
        routes.insert(ROUTE_ID, route());

        Self {
            routes: Arc::new(routes),
            now: Arc::new(Mutex::new(at(now))),
            published: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            response: Arc::new(Mutex::new((StatusCode::OK, Bytes::from_static(b"[]")))),
            fail_publish: false,
        }
    }

    #[must_use]
    pub const fn failing_publish(mut self) -> Self {
        self.fail_publish = true;
        self
    }

    pub fn set_now(&self, now: i64) {
        *self.now.lock().expect("should lock") = at(now);
    }

    pub fn respond(&self, status: StatusCode, body: &serde_json::Value) {
        *self.response.lock().expect("should lock") = (status, Bytes::from(body.to_string()));
    }

    pub fn published(&self) -> Vec<(String, Message)> {
        self.published.lock().expect("should lock").clone()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("should lock").clone()
    }
}

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).expect("valid timestamp")
}

impl HttpRequest for MockProvider {
    async fn fetch<T>(&self, request: Request<T>) -> Result<Response<Bytes>>
    where
        T: Body + Any + Send,
        T::Data: Into<Vec<u8>>,
        T::Error: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        let headers = request
            .headers()
            .iter()
            .map(|(name, value)| {
                (name.to_string(), value.to_str().unwrap_or_default().to_string())
            })
            .collect();
        self.requests
            .lock()
            .expect("should lock")
            .push(Recorded { uri: request.uri().to_string(), headers });

        let (status, body) = self.response.lock().expect("should lock").clone();
        Response::builder().status(status).body(body).map_err(Into::into)
    }
}

impl Publisher for MockProvider {
    async fn send(&self, topic: &str, message: &Message) -> Result<()> {
        if self.fail_publish {
            return Err(anyhow!("broker unavailable"));
        }
        self.published.lock().expect("should lock").push((topic.to_string(), message.clone()));
        Ok(())
    }
}

impl Clock for MockProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("should lock")
    }
}

impl RouteGeometry for MockProvider {
    fn route(&self, route_id: &str) -> Option<Arc<RouteShape>> {
        self.routes.route(route_id)
    }
}
