use thiserror::Error;

/// Result type used by the transport.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport failures surfaced to the session owner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The peer closed the connection with a code the owner does not
    /// recognise.
    #[error("code: {code}, description: unexpected close {reason}")]
    UnexpectedClose { code: u16, reason: String },

    /// The physical socket or session task failed.
    #[error("code: 500, description: socket {0}")]
    Socket(String),
}

impl Error {
    /// Close code for [`Error::UnexpectedClose`].
    #[must_use]
    pub const fn close_code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedClose { code, .. } => Some(*code),
            Self::Socket(_) => None,
        }
    }
}
