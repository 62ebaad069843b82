//! # Vehicle Realtime
//!
//! Tracks vehicle positions from a streaming push feed and a periodic pull
//! feed, snapping each accepted report onto its route and publishing it to
//! the route's topic.

mod config;
mod service;

pub use self::config::Config;
pub use self::service::{FeedHandler, Service, is_known_close};
