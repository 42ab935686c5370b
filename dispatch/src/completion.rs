//! Shared completion tracking for one dispatch call.

use std::pin::pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use plex_types::{Fault, ProtocolError};
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};

/// Outcome slot for one sub-request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionEntry {
    Pending,
    /// Raw response fragment.
    Succeeded(String),
    Failed(Fault),
}

impl CompletionEntry {
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, CompletionEntry::Pending)
    }
}

/// How long the collector waits for stragglers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Never,
    After(Duration),
}

impl Deadline {
    /// Negative values wait forever.
    #[must_use]
    pub fn from_millis(millis: i64) -> Self {
        u64::try_from(millis).map_or(Deadline::Never, |ms| {
            Deadline::After(Duration::from_millis(ms))
        })
    }

    /// Deadline from a raw `connection-timeout` value, falling back to
    /// `default_millis` when the parameter is absent.
    pub fn from_param(raw: Option<&str>, default_millis: i64) -> Result<Self, ProtocolError> {
        match raw {
            None => Ok(Self::from_millis(default_millis)),
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map(Self::from_millis)
                .map_err(|_| ProtocolError::InvalidTimeout {
                    value: raw.to_string(),
                }),
        }
    }
}

#[derive(Debug)]
struct Inner {
    entries: Vec<CompletionEntry>,
    remaining: usize,
}

/// Monitor-guarded outcomes of every sub-request in one envelope.
///
/// Workers only take the lock to record. The collector parks on the
/// notifier, never on the lock.
#[derive(Debug)]
pub struct CompletionState {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl CompletionState {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: vec![CompletionEntry::Pending; len],
                remaining: len,
            }),
            notify: Notify::new(),
        }
    }

    /// Store the outcome for `index` and wake every waiter.
    ///
    /// Returns `false` when the record was ignored: `Pending` entries,
    /// indices out of range, and slots that already hold a final outcome.
    pub fn record(&self, index: usize, entry: CompletionEntry) -> bool {
        if entry.is_pending() {
            return false;
        }
        {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let len = inner.entries.len();
            let Some(slot) = inner.entries.get_mut(index) else {
                tracing::warn!(index, len, "Ignoring record for unknown sub-request");
                return false;
            };
            if !slot.is_pending() {
                tracing::warn!(index, "Ignoring duplicate record for sub-request");
                return false;
            }
            *slot = entry;
            inner.remaining -= 1;
        }
        self.notify.notify_waiters();
        true
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remaining
            == 0
    }

    /// Wait until every entry is final or the deadline passes.
    ///
    /// Returns the done flag at return time. Expiry is not an error.
    pub async fn await_done(&self, deadline: Deadline) -> bool {
        let until = match deadline {
            Deadline::Never => None,
            Deadline::After(duration) => Some(Instant::now() + duration),
        };
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register before checking so a record between the check and the
            // await is not lost.
            notified.as_mut().enable();
            if self.is_done() {
                return true;
            }
            match until {
                None => notified.await,
                Some(until) => {
                    if timeout_at(until, notified).await.is_err() {
                        return self.is_done();
                    }
                }
            }
        }
    }

    /// Entries in sub-request order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CompletionEntry> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
