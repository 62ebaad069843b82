//! # Transport
//!
//! Presents a single logical, always-on connection over a physical socket
//! that may drop, stall, or error. The session owns reconnect policy: stalls
//! and recoverable failures schedule a restart, while a close code the
//! [`Handler`] rejects ends the session with an error.
//!
//! The physical socket is supplied by the host through [`Connector`] and
//! [`Socket`]; socket events are delivered to the session over a channel so
//! the reconnect logic can be driven without a live network.

mod error;
mod session;
mod socket;

pub use crate::error::*;
pub use crate::session::*;
pub use crate::socket::*;
