//! One task per sub-request, joined through [`CompletionState`].

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use plex_types::Envelope;

use crate::{
    CompletionEntry, CompletionState, Deadline, DispatchError, Handler, Invocation, Resolver,
    aggregate,
};

/// Fans envelopes out to handlers resolved through a shared [`Resolver`].
#[derive(Clone)]
pub struct Dispatcher {
    resolver: Arc<dyn Resolver>,
}

impl Dispatcher {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }

    /// Spawn one worker per sub-request and return the state they record
    /// into. Must be called from within a tokio runtime.
    ///
    /// Workers are detached: they run to completion even if nobody waits
    /// for the returned state.
    #[must_use]
    pub fn spawn(&self, envelope: &Envelope) -> Arc<CompletionState> {
        let state = Arc::new(CompletionState::new(envelope.len()));
        for (index, request) in envelope.requests().iter().enumerate() {
            let call = Invocation::new(request.clone(), envelope.format());
            let resolver = Arc::clone(&self.resolver);
            let state = Arc::clone(&state);
            tracing::debug!(index, handler = call.name(), "Dispatching sub-request");
            tokio::spawn(async move {
                let entry = run_one(resolver.as_ref(), &call).await;
                if let CompletionEntry::Failed(fault) = &entry {
                    tracing::warn!(index, handler = call.name(), %fault, "Sub-request failed");
                }
                state.record(index, entry);
            });
        }
        state
    }

    /// Run every sub-request, wait up to `deadline` and build the response
    /// envelope. Unfinished sub-requests come back timed out.
    pub async fn dispatch(&self, envelope: &Envelope, deadline: Deadline) -> Envelope {
        let state = self.spawn(envelope);
        let done = state.await_done(deadline).await;
        if !done {
            tracing::warn!(?deadline, "Deadline expired before every sub-request finished");
        }
        aggregate(envelope, &state)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

/// Resolve, execute and release one handler.
///
/// Panics in the resolver, the handler or its release are caught so the
/// caller always has an entry to record.
async fn run_one(resolver: &dyn Resolver, call: &Invocation) -> CompletionEntry {
    let handler = match panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve(call.name()))) {
        Ok(Ok(handler)) => handler,
        Ok(Err(err)) => return CompletionEntry::Failed(err.fault()),
        Err(payload) => return panicked(&payload),
    };
    let mut lease = Lease::new(handler);
    let result = AssertUnwindSafe(lease.execute(call)).catch_unwind().await;
    if let Err(message) = lease.finish() {
        tracing::warn!(handler = call.name(), %message, "Handler release panicked");
    }

    match result {
        Ok(Ok(output)) => CompletionEntry::Succeeded(output),
        Ok(Err(err)) => CompletionEntry::Failed(err.fault()),
        Err(payload) => panicked(&payload),
    }
}

fn panicked(payload: &Box<dyn Any + Send>) -> CompletionEntry {
    let message = panic_payload_to_string(payload);
    CompletionEntry::Failed(DispatchError::Panicked { message }.fault())
}

/// Releases the handler exactly once: explicitly through [`Lease::finish`],
/// or on drop if the task is torn down first.
struct Lease {
    handler: Box<dyn Handler>,
    released: bool,
}

impl Lease {
    fn new(handler: Box<dyn Handler>) -> Self {
        Self {
            handler,
            released: false,
        }
    }

    fn finish(&mut self) -> Result<(), String> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let handler = &mut self.handler;
        panic::catch_unwind(AssertUnwindSafe(|| handler.release()))
            .map_err(|payload| panic_payload_to_string(&payload))
    }
}

impl Deref for Lease {
    type Target = dyn Handler;

    fn deref(&self) -> &Self::Target {
        self.handler.as_ref()
    }
}

impl DerefMut for Lease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.handler.as_mut()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Err(message) = self.finish() {
            tracing::warn!(handler = self.handler.name(), %message, "Handler release panicked");
        }
    }
}

fn panic_payload_to_string(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
