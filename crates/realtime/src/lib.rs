//! # Realtime Core
//!
//! Core modules shared by the vehicle position pipeline: the domain error type
//! and the traits implemented by host-provided collaborators.

mod error;
mod provider;

pub use crate::error::*;
pub use crate::provider::*;
