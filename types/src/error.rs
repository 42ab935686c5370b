use thiserror::Error;

use crate::Format;

/// Envelope-level failure. Fatal for a dispatch: nothing is executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed {format} envelope: {message}")]
    Malformed { format: Format, message: String },
    #[error("Sub-request {index} is missing its name")]
    MissingName { index: usize },
    #[error("Sub-request name must not be empty")]
    EmptyName,
    #[error("Unbalanced XML at byte {offset}: {message}")]
    Unbalanced { offset: usize, message: String },
    #[error("Parameter '{key}' is reserved for the sub-request list")]
    ReservedParameter { key: String },
    #[error("Invalid {field}: {message}")]
    InvalidField { field: String, message: String },
    #[error("Invalid connection-timeout '{value}'")]
    InvalidTimeout { value: String },
}

impl ProtocolError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}
