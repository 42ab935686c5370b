//! Envelope model for Plex.
//!
//! This crate contains the in-memory representation of multiplexed messages:
//! ordered sub-requests, duplicate-preserving parameter multimaps, the wire
//! format discriminator and per-entry outcomes. Pure data with no IO and no
//! async; serialization lives in `plex-codec`.

mod envelope;
mod error;
mod fault;
mod params;
mod request;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use envelope::{Envelope, EnvelopeBuilder};
pub use error::ProtocolError;
pub use fault::{Fault, Outcome, Status};
pub use params::Params;
pub use request::{SubRequest, SubRequestBuilder};

/// Top-level parameter naming the target host.
pub const TARGET_PARAM: &str = "target";
/// Top-level parameter holding the collector deadline in milliseconds.
pub const CONNECTION_TIMEOUT_PARAM: &str = "connection-timeout";
/// Key of the sub-request list; reserved at the top level.
pub const DATA_KEY: &str = "data";

/// Wire serialization of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    Xml,
}

impl Format {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Xml => "xml",
        }
    }

    /// Parse a format name, case-insensitively.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "xml" => Ok(Format::Xml),
            other => Err(ProtocolError::InvalidField {
                field: "format".to_string(),
                message: format!("unknown format '{other}'"),
            }),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => f.write_str("JSON"),
            Format::Xml => f.write_str("XML"),
        }
    }
}
