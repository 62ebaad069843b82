//! Errors raised while decoding, sequencing and publishing vehicle reports.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = anyhow::Result<T, Error>;

/// Domain level error type.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Error {
    /// Unexpected failure with no more specific classification.
    #[error("code: 500, description: {0}")]
    Internal(String),

    /// An upstream feed failed or answered with an error status.
    #[error("code: 502, description: {0}")]
    BadGateway(String),

    /// A payload did not match the expected shape.
    #[error("code: 500, description: invalid_format {0}")]
    InvalidFormat(String),

    /// A required field was absent from a payload.
    #[error("code: 500, description: missing_field {0}")]
    MissingField(String),

    /// A report timestamp could not be interpreted.
    #[error("code: 500, description: invalid_timestamp {0}")]
    InvalidTimestamp(String),
}

impl Error {
    #[must_use]
    pub const fn code(&self) -> StatusCode {
        match self {
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        let chain = err.chain().map(ToString::to_string).collect::<Vec<_>>().join(" -> ");

        // keep the variant of a wrapped domain error
        let Some(inner) = err.downcast_ref::<Self>() else {
            return Self::Internal(chain);
        };
        tracing::debug!("{err} caused by {inner}");

        match inner {
            Self::Internal(_) => Self::Internal(chain),
            Self::BadGateway(_) => Self::BadGateway(chain),
            Self::InvalidFormat(detail) => Self::InvalidFormat(format!("{err}: {detail}")),
            Self::MissingField(detail) => Self::MissingField(format!("{err}: {detail}")),
            Self::InvalidTimestamp(detail) => Self::InvalidTimestamp(format!("{err}: {detail}")),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidFormat(err.to_string())
    }
}

/// Build an [`Error::BadGateway`] from format arguments.
#[macro_export]
macro_rules! bad_gateway {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::BadGateway(format!($fmt, $($arg)*))
    };
    ($msg:expr $(,)?) => {
        $crate::Error::BadGateway(format!($msg))
    };
}

/// Build an [`Error::InvalidFormat`] from format arguments.
#[macro_export]
macro_rules! invalid_format {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::InvalidFormat(format!($fmt, $($arg)*))
    };
    ($msg:expr $(,)?) => {
        $crate::Error::InvalidFormat(format!($msg))
    };
}
