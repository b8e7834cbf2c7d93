//! The completion handle: a single-assignment, observable terminal state.
//!
//! Every [`crate::source::Source`] owns exactly one `Completion`. It is the
//! authoritative "has this source terminated, and how" predicate that the
//! chain graph (child removal, parent cancellation) and the blocking bridge
//! (`get`/`await`) both rendezvous on.
//!
//! A small terminal enum plus a registration list of one-shot observers,
//! plus the blocking `await` semantics this engine needs.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

use serde_json::Value;

use crate::error::{ReactorError, Result};

/// The payload of a failed completion: an error value plus metadata tags
/// identifying where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// The raised/propagated error value.
    pub error: Value,
    /// Metadata tags, e.g. `"exception in on_item callback"`.
    pub tags: Vec<String>,
}

impl Failure {
    /// Build a failure with no tags.
    pub fn new(error: Value) -> Self {
        Failure {
            error,
            tags: Vec::new(),
        }
    }

    /// Build a failure with tags.
    pub fn tagged(error: Value, tags: Vec<String>) -> Self {
        Failure { error, tags }
    }
}

impl From<ReactorError> for Failure {
    fn from(err: ReactorError) -> Self {
        let tags = err.tags();
        Failure::tagged(err.into_value(), tags)
    }
}

/// One of the three terminal states a completion can settle into.
#[derive(Debug, Clone, PartialEq)]
pub enum Ready {
    /// Terminated successfully with a value.
    Done(Value),
    /// Terminated with a failure payload.
    Failed(Failure),
    /// Terminated by cancellation; carries no payload.
    Cancelled,
}

impl Ready {
    /// True for [`Ready::Done`].
    pub fn is_done(&self) -> bool {
        matches!(self, Ready::Done(_))
    }

    /// True for [`Ready::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self, Ready::Failed(_))
    }

    /// True for [`Ready::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Ready::Cancelled)
    }
}

type Observer = Box<dyn FnOnce(&Ready) + Send>;

enum State {
    Pending(Vec<Observer>),
    Settled(Ready),
}

struct Inner {
    state: Mutex<State>,
    condvar: Condvar,
}

/// A single-assignment, observable terminal state.
///
/// `Completion` is cheap to clone — clones share the same underlying state
/// via `Arc`, so registering an observer on a clone is the same as
/// registering on the original.
#[derive(Clone)]
pub struct Completion {
    inner: Arc<Inner>,
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl Completion {
    /// Construct a new, pending completion.
    pub fn new() -> Self {
        Completion {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending(Vec::new())),
                condvar: Condvar::new(),
            }),
        }
    }

    fn settle(&self, ready: Ready) -> Result<()> {
        let observers = {
            let mut state = self.inner.state.lock().unwrap();
            match &mut *state {
                State::Settled(_) => return Err(ReactorError::AlreadyCompleted),
                State::Pending(observers) => {
                    let observers = std::mem::take(observers);
                    *state = State::Settled(ready.clone());
                    observers
                }
            }
        };
        self.inner.condvar.notify_all();
        for observer in observers {
            observer(&ready);
        }
        Ok(())
    }

    /// Transition pending → done. Fails if already terminal.
    pub fn done(&self, value: Value) -> Result<()> {
        self.settle(Ready::Done(value))
    }

    /// Transition pending → failed, carrying `err` and `tags`.
    pub fn fail(&self, err: Value, tags: Vec<String>) -> Result<()> {
        self.settle(Ready::Failed(Failure::tagged(err, tags)))
    }

    /// Transition pending → cancelled.
    pub fn cancel(&self) -> Result<()> {
        self.settle(Ready::Cancelled)
    }

    /// Register an observer, firing it exactly once: immediately if already
    /// terminal (synchronously, on the calling thread), or on the thread
    /// that eventually calls `done`/`fail`/`cancel` otherwise.
    pub fn on_ready<F>(&self, cb: F)
    where
        F: FnOnce(&Ready) + Send + 'static,
    {
        let mut state = self.inner.state.lock().unwrap();
        match &mut *state {
            State::Settled(ready) => {
                let ready = ready.clone();
                drop(state);
                cb(&ready);
            }
            State::Pending(observers) => observers.push(Box::new(cb)),
        }
    }

    /// Whether this completion has transitioned.
    pub fn is_ready(&self) -> bool {
        matches!(&*self.inner.state.lock().unwrap(), State::Settled(_))
    }

    /// Whether this completion transitioned to done.
    pub fn is_done(&self) -> bool {
        matches!(&*self.inner.state.lock().unwrap(), State::Settled(Ready::Done(_)))
    }

    /// Whether this completion transitioned to failed.
    pub fn is_failed(&self) -> bool {
        matches!(&*self.inner.state.lock().unwrap(), State::Settled(Ready::Failed(_)))
    }

    /// Whether this completion transitioned to cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(&*self.inner.state.lock().unwrap(), State::Settled(Ready::Cancelled))
    }

    /// The failure payload, if terminated as failed.
    pub fn failure(&self) -> Option<Failure> {
        match &*self.inner.state.lock().unwrap() {
            State::Settled(Ready::Failed(failure)) => Some(failure.clone()),
            _ => None,
        }
    }

    /// Block the calling thread until this completion is ready, returning
    /// the terminal state. This is the engine's only suspension point
    ///
    pub fn await_ready(&self) -> Ready {
        let mut state = self.inner.state.lock().unwrap();
        loop {
            match &*state {
                State::Settled(ready) => return ready.clone(),
                State::Pending(_) => {
                    state = self.inner.condvar.wait(state).unwrap();
                }
            }
        }
    }

    /// Return a new completion that, when `self` transitions to done with
    /// value `v`, transitions to done with `f(v)`. Other terminal states
    /// (failed/cancelled) propagate unchanged.
    pub fn transform<F>(&self, f: F) -> Completion
    where
        F: FnOnce(Value) -> Value + Send + 'static,
    {
        let downstream = Completion::new();
        let sink = downstream.clone();
        self.on_ready(move |ready| {
            let _ = match ready.clone() {
                Ready::Done(value) => sink.done(f(value)),
                Ready::Failed(failure) => sink.fail(failure.error, failure.tags),
                Ready::Cancelled => sink.cancel(),
            };
        });
        downstream
    }
}
