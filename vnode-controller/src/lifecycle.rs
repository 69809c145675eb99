//! Readiness/completion gates and the terminal error slot.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use crate::error::ControllerError;

/// One-shot latch. Opening is idempotent; any number of tasks may wait.
#[derive(Debug)]
pub struct Gate {
    open: watch::Sender<bool>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self { open }
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Resolve once the gate is open. Never resolves if it stays closed.
    pub async fn wait(&self) {
        let mut rx = self.open.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail.
        let _ = rx.wait_for(|open| *open).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::NotStarted => write!(f, "not-started"),
            EngineState::Running => write!(f, "running"),
            EngineState::Stopping => write!(f, "stopping"),
            EngineState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: EngineState,
    started: bool,
    err: Option<ControllerError>,
}

/// Whole-engine state, guarded by one mutex.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    inner: Mutex<Inner>,
    ready: Gate,
    done: Gate,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: EngineState::NotStarted,
                started: false,
                err: None,
            }),
            ready: Gate::new(),
            done: Gate::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the single run. `false` if the engine was already started.
    pub(crate) fn begin(&self) -> bool {
        let mut inner = self.lock();
        if inner.started {
            return false;
        }
        inner.started = true;
        true
    }

    pub(crate) fn mark_running(&self) {
        self.lock().state = EngineState::Running;
        self.ready.open();
    }

    pub(crate) fn mark_stopping(&self) {
        self.lock().state = EngineState::Stopping;
    }

    /// Record the outcome and open the completion gate. First call wins.
    pub(crate) fn finish(&self, result: &Result<(), ControllerError>) {
        {
            let mut inner = self.lock();
            if inner.state == EngineState::Stopped {
                return;
            }
            inner.err = result.as_ref().err().cloned();
            inner.state = EngineState::Stopped;
        }
        self.done.open();
    }

    pub(crate) fn state(&self) -> EngineState {
        self.lock().state
    }

    pub(crate) fn err(&self) -> Option<ControllerError> {
        self.lock().err.clone()
    }

    pub(crate) fn ready(&self) -> &Gate {
        &self.ready
    }

    pub(crate) fn done(&self) -> &Gate {
        &self.done
    }
}
