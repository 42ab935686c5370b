//! Concurrent dispatch of envelope sub-requests.
//!
//! A [`Dispatcher`] fans one envelope out into one tokio task per
//! sub-request. Each task resolves a [`Handler`] through a [`Resolver`],
//! runs it, releases it and records the outcome into a shared
//! [`CompletionState`]. The collector waits on that state under a single
//! [`Deadline`] and [`aggregate`] turns whatever has finished into the
//! response envelope, in request order.

mod aggregate;
pub mod builtins;
mod completion;
mod pool;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use plex_types::{Fault, Format, Params, SubRequest};
use thiserror::Error;

pub use aggregate::aggregate;
pub use completion::{CompletionEntry, CompletionState, Deadline};
pub use pool::Dispatcher;

/// Future returned by [`Handler::execute`].
pub type HandlerFut<'a> = Pin<Box<dyn Future<Output = Result<String, DispatchError>> + Send + 'a>>;

/// Error types for handler resolution and execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Unknown handler: {name}")]
    UnknownHandler { name: String },
    #[error("Duplicate handler registered: {name}")]
    DuplicateHandler { name: String },
    #[error("Handler execution failed: {0}")]
    Execution(Fault),
    #[error("Handler panicked: {message}")]
    Panicked { message: String },
}

impl DispatchError {
    /// Execution failure with the general error code.
    pub fn failed(message: impl Into<String>) -> Self {
        DispatchError::Execution(Fault::general(message))
    }

    /// Execution failure rejecting the caller's parameters.
    pub fn bad_params(message: impl Into<String>) -> Self {
        DispatchError::Execution(Fault::new(Fault::BAD_REQUEST).with_message(message))
    }

    /// Fault recorded for the sub-request that hit this error.
    #[must_use]
    pub fn fault(&self) -> Fault {
        match self {
            DispatchError::UnknownHandler { name } => Fault::new(Fault::NOT_FOUND)
                .with_message("handler not found")
                .with_detail(name.clone()),
            DispatchError::DuplicateHandler { name } => {
                Fault::general("duplicate handler").with_detail(name.clone())
            }
            DispatchError::Execution(fault) => fault.clone(),
            DispatchError::Panicked { message } => {
                Fault::general("handler panicked").with_detail(message.clone())
            }
        }
    }
}

/// One sub-request as seen by its handler.
#[derive(Debug, Clone)]
pub struct Invocation {
    request: SubRequest,
    format: Format,
}

impl Invocation {
    /// `envelope_format` decides the format of fragments on requests without
    /// an explicit override.
    pub fn new(request: SubRequest, envelope_format: Format) -> Self {
        let format = request.effective_format(envelope_format);
        Self { request, format }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.request.name()
    }

    #[must_use]
    pub fn params(&self) -> &Params {
        self.request.params()
    }

    /// Raw payload fragment, if the caller sent one.
    #[must_use]
    pub fn data(&self) -> Option<&str> {
        self.request.data()
    }

    /// Format the payload is in and the output is expected in.
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    #[must_use]
    pub fn request(&self) -> &SubRequest {
        &self.request
    }
}

/// Executable implementation for one sub-request.
///
/// A fresh handler is resolved per sub-request. `release` runs exactly once
/// after `execute` finishes, fails or panics, and also when the owning task
/// is torn down before completion.
pub trait Handler: Send {
    fn name(&self) -> &'static str;

    /// Produce the raw response fragment in `call.format()`.
    fn execute<'a>(&'a mut self, call: &'a Invocation) -> HandlerFut<'a>;

    fn release(&mut self) {}
}

/// Maps a handler name to a fresh [`Handler`].
pub trait Resolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Box<dyn Handler>, DispatchError>;
}

type Factory = Box<dyn Fn() -> Box<dyn Handler> + Send + Sync>;

/// In-memory registry of handler factories keyed by name.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, Factory>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with [`builtins`].
    ///
    /// # Errors
    /// Returns [`DispatchError::DuplicateHandler`] if two built-ins share a name.
    pub fn with_builtins() -> Result<Self, DispatchError> {
        let mut registry = Self::new();
        builtins::register_builtins(&mut registry)?;
        Ok(registry)
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), DispatchError>
    where
        F: Fn() -> Box<dyn Handler> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(DispatchError::DuplicateHandler { name });
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Resolver for HandlerRegistry {
    fn resolve(&self, name: &str) -> Result<Box<dyn Handler>, DispatchError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| DispatchError::UnknownHandler {
                name: name.to_string(),
            })
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
