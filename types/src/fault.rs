//! Per-entry outcomes and the fault triple carried by failures.

use std::fmt;

use crate::ProtocolError;

/// Numeric code, user-facing message and supplemental data of a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: u16,
    pub message: Option<String>,
    pub detail: Option<String>,
}

impl Fault {
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const NOT_FOUND: u16 = 404;
    pub const TOO_LARGE: u16 = 413;
    pub const GENERAL_ERROR: u16 = 500;
    pub const TIMED_OUT: u16 = 504;

    #[must_use]
    pub fn new(code: u16) -> Self {
        Self {
            code,
            message: None,
            detail: None,
        }
    }

    /// A general error with a user-facing message.
    #[must_use]
    pub fn general(message: impl Into<String>) -> Self {
        Self::new(Self::GENERAL_ERROR).with_message(message)
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

impl Default for Fault {
    fn default() -> Self {
        Self::new(Self::GENERAL_ERROR)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.code)?;
        if let Some(message) = &self.message {
            write!(f, " {message}")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// Wire status of a response entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Succeeded,
    Failed,
    TimedOut,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Status::Succeeded => "succeeded",
            Status::Failed => "failed",
            Status::TimedOut => "timed-out",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        match raw {
            "succeeded" => Ok(Status::Succeeded),
            "failed" => Ok(Status::Failed),
            "timed-out" => Ok(Status::TimedOut),
            other => Err(ProtocolError::invalid(
                "status",
                format!("unknown status '{other}'"),
            )),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result of one sub-request as reported in a response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed(Fault),
    TimedOut,
}

impl Outcome {
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Outcome::Succeeded => Status::Succeeded,
            Outcome::Failed(_) => Status::Failed,
            Outcome::TimedOut => Status::TimedOut,
        }
    }

    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Outcome::Failed(fault) => Some(fault),
            Outcome::Succeeded | Outcome::TimedOut => None,
        }
    }
}
