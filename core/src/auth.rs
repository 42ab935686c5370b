//! Authentication hook.
//!
//! The multiplexer calls [`Authenticator::auth`] once per envelope, after
//! parsing and before any sub-request runs. Policy lives entirely in the
//! implementation.

use plex_types::{Fault, Params};
use thiserror::Error;

/// Rejection raised by an [`Authenticator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct AuthError {
    pub code: u16,
    pub message: String,
    pub detail: Option<String>,
}

impl AuthError {
    /// Rejection with the unauthorized code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: Fault::UNAUTHORIZED,
            message: message.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn fault(&self) -> Fault {
        let fault = Fault::new(self.code).with_message(self.message.clone());
        match &self.detail {
            Some(detail) => fault.with_detail(detail.clone()),
            None => fault,
        }
    }
}

/// Transport-level facts about the caller.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub remote: Option<String>,
    pub headers: Params,
}

/// Identity an authenticator vouched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    name: String,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub trait Authenticator: Send + Sync {
    /// Called once before the first envelope.
    fn initialize(&mut self, _config: &Params) -> Result<(), AuthError> {
        Ok(())
    }

    /// `params` are the envelope's top-level parameters.
    fn auth(&self, params: &Params, meta: &RequestMeta) -> Result<Principal, AuthError>;

    /// Called once when the multiplexer is dropped.
    fn destroy(&mut self) {}
}

/// Accepts every caller as [`Principal::anonymous`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn auth(&self, _params: &Params, _meta: &RequestMeta) -> Result<Principal, AuthError> {
        Ok(Principal::anonymous())
    }
}
