//! Shared test utilities and fixtures
//!
//! Handlers with controllable behavior and a registry that counts how
//! often handlers are resolved, executed and released.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use plex_dispatch::{
    DispatchError, Handler, HandlerFut, HandlerRegistry, Invocation, Resolver,
};

/// Counters shared by every handler a [`TestRegistry`] hands out.
#[derive(Debug, Default)]
pub struct Counters {
    pub resolved: AtomicUsize,
    pub executed: AtomicUsize,
    pub released: AtomicUsize,
}

impl Counters {
    pub fn resolved(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Return the fixed fragment.
    Reply(&'static str),
    /// Sleep, then return the fixed fragment.
    Delay(Duration, &'static str),
    Fail,
    Panic,
    /// Never finish.
    Hang,
}

pub struct TestHandler {
    behavior: Behavior,
    counters: Arc<Counters>,
}

impl Handler for TestHandler {
    fn name(&self) -> &'static str {
        "test"
    }

    fn execute<'a>(&'a mut self, _call: &'a Invocation) -> HandlerFut<'a> {
        self.counters.executed.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior;
        Box::pin(async move {
            match behavior {
                Behavior::Reply(out) => Ok(out.to_string()),
                Behavior::Delay(wait, out) => {
                    tokio::time::sleep(wait).await;
                    Ok(out.to_string())
                }
                Behavior::Fail => Err(DispatchError::failed("test failure")),
                Behavior::Panic => panic!("test panic"),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    Ok(String::new())
                }
            }
        })
    }

    fn release(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Registry of [`TestHandler`]s sharing one set of [`Counters`].
pub struct TestRegistry {
    inner: HandlerRegistry,
    pub counters: Arc<Counters>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self {
            inner: HandlerRegistry::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with(mut self, name: &str, behavior: Behavior) -> Self {
        let counters = Arc::clone(&self.counters);
        self.inner
            .register(name, move || {
                Box::new(TestHandler {
                    behavior,
                    counters: Arc::clone(&counters),
                })
            })
            .unwrap();
        self
    }
}

impl Resolver for TestRegistry {
    fn resolve(&self, name: &str) -> Result<Box<dyn Handler>, DispatchError> {
        self.counters.resolved.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(name)
    }
}

/// Split a [`TestRegistry`] into the resolver and a handle on its counters.
pub fn into_parts(registry: TestRegistry) -> (Arc<dyn Resolver>, Arc<Counters>) {
    let counters = Arc::clone(&registry.counters);
    (Arc::new(registry), counters)
}
