//! Fatal errors for a whole envelope and their fault codes.
//!
//! Per-sub-request failures never surface here; they are recorded inline in
//! the response envelope.

use plex_types::{Fault, ProtocolError};
use thiserror::Error;

use crate::AuthError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MuxError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("Message of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("Envelope carries {count} sub-requests, limit is {limit}")]
    TooManyRequests { count: usize, limit: usize },
}

impl MuxError {
    /// Fault reported to the caller.
    #[must_use]
    pub fn fault(&self) -> Fault {
        match self {
            MuxError::Protocol(err) => Fault::new(Fault::BAD_REQUEST)
                .with_message("malformed envelope")
                .with_detail(err.to_string()),
            MuxError::Auth(err) => err.fault(),
            MuxError::TooLarge { .. } => Fault::new(Fault::TOO_LARGE)
                .with_message("message too large")
                .with_detail(self.to_string()),
            MuxError::TooManyRequests { .. } => Fault::new(Fault::BAD_REQUEST)
                .with_message("too many sub-requests")
                .with_detail(self.to_string()),
        }
    }
}

/// One-line rendering of a fatal error for logs and stderr.
#[must_use]
pub fn format_error(err: &MuxError) -> String {
    format!("Error {}", err.fault())
}
