//! The source node: a push endpoint, and the parent/child chaining graph
//! built on top of it.
//!
//! A `Source` is always held behind an `Arc` — parents own children
//! strongly (so a chain's lifetime is anchored at the root for as long as
//! any operator wants it), children observe parents only through a `Weak`
//! back-reference. The removal idiom below (swap the callback list out of
//! its mutex, run outside the lock, merge back in) avoids re-entering a
//! non-reentrant `std::sync::Mutex` when a callback synchronously
//! completes its own downstream mid-dispatch.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use crate::codec::CodecFactory;
use crate::completion::{Completion, Ready};
use crate::error::{ReactorError, Result};

/// An item callback: observes one emitted value, returning `Err` to fail
/// the emitting source.
pub type ItemCallback = Box<dyn FnMut(&Value) -> Result<()> + Send>;

/// A deferred action that kicks off a root source's emissions, invoked by
/// the blocking bridge (`get`) once it has walked up to the root.
pub type OnGet = Box<dyn FnOnce(&Arc<Source>) + Send>;

struct OnItemState {
    callbacks: Vec<(u64, ItemCallback)>,
    /// Removals requested while `callbacks` has been swapped out of the
    /// mutex for dispatch (see [`Source::emit`]).
    pending_removals: HashSet<u64>,
    checked_out: bool,
}

impl OnItemState {
    fn new() -> Self {
        OnItemState {
            callbacks: Vec::new(),
            pending_removals: HashSet::new(),
            checked_out: false,
        }
    }
}

/// A push endpoint: holds item-callbacks, a completion handle, a parent
/// link, a children list, and an optional deferred root action.
pub struct Source {
    label: String,
    parent: Option<Weak<Source>>,
    children: Mutex<Vec<Arc<Source>>>,
    on_item: Mutex<OnItemState>,
    next_callback_id: AtomicU64,
    completed: Completion,
    is_paused: AtomicBool,
    on_get: Mutex<Option<OnGet>>,
    /// Per-source second-chance codec lookup: "additional kinds are discovered
    /// by looking up a method named `encode_<kind>` / `decode_<kind>` on the
    /// source before failing." Rust has no runtime
    /// method reflection, so this models the same fallback as an explicit
    /// name-keyed table a source can register into at construction, checked
    /// only after the process-wide registry ([`crate::codec`]) misses.
    encode_extensions: Mutex<HashMap<String, CodecFactory>>,
    decode_extensions: Mutex<HashMap<String, CodecFactory>>,
}

impl Source {
    /// Construct a root source with no parent.
    pub fn new(label: impl Into<String>) -> Arc<Source> {
        Self::build(label.into(), None)
    }

    fn build(label: String, parent: Option<Weak<Source>>) -> Arc<Source> {
        let source = Arc::new(Source {
            label,
            parent,
            children: Mutex::new(Vec::new()),
            on_item: Mutex::new(OnItemState::new()),
            next_callback_id: AtomicU64::new(0),
            completed: Completion::new(),
            is_paused: AtomicBool::new(false),
            on_get: Mutex::new(None),
            encode_extensions: Mutex::new(HashMap::new()),
            decode_extensions: Mutex::new(HashMap::new()),
        });
        Self::wire_self_cleanup(&source);
        source
    }

    /// Wire the self-cleanup observer every source needs on its own
    /// completion: once ready, clear `on_item` and
    /// notify the parent so it can drop this child.
    fn wire_self_cleanup(source: &Arc<Source>) {
        let weak = Arc::downgrade(source);
        source.completed.on_ready(move |ready| {
            if let Some(this) = weak.upgrade() {
                this.on_item.lock().unwrap().callbacks.clear();
                if let Some(parent) = this.parent.as_ref().and_then(Weak::upgrade) {
                    parent.on_child_terminated(&this, ready);
                }
            }
        });
    }

    /// Construct a new child source with `parent = self` (weak), pushed
    /// onto `self`'s strong `children` list.
    pub fn chained(self: &Arc<Self>, label: impl Into<String>) -> Arc<Source> {
        let child = Self::build(label.into(), Some(Arc::downgrade(self)));
        self.children.lock().unwrap().push(Arc::clone(&child));
        child
    }

    /// Called by a child (via its self-cleanup observer) once its own
    /// completion has settled. Removes the child and, if no children
    /// remain and this source is not yet ready, cancels it.
    fn on_child_terminated(self: &Arc<Self>, child: &Arc<Source>, _ready: &Ready) {
        let became_empty = {
            let mut children = self.children.lock().unwrap();
            children.retain(|c| !Arc::ptr_eq(c, child));
            children.is_empty()
        };
        if became_empty && !self.completed.is_ready() {
            tracing::debug!(label = %self.label, "root kept alive only by children; cancelling, last child terminated");
            let _ = self.completed.cancel();
        }
    }

    fn add_item_callback<F>(&self, cb: F) -> u64
    where
        F: FnMut(&Value) -> Result<()> + Send + 'static,
    {
        let id = self.next_callback_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.on_item.lock().unwrap();
        state.callbacks.push((id, Box::new(cb)));
        id
    }

    fn remove_item_callback(&self, id: u64) {
        let mut state = self.on_item.lock().unwrap();
        if state.checked_out {
            state.pending_removals.insert(id);
        } else {
            state.callbacks.retain(|(cid, _)| *cid != id);
        }
    }

    /// Append `cb` to `on_item`; return `self`. Intended for terminal sinks
    /// that don't need automatic cleanup via a downstream.
    pub fn each<F>(self: &Arc<Self>, cb: F) -> Arc<Source>
    where
        F: FnMut(&Value) -> Result<()> + Send + 'static,
    {
        self.add_item_callback(cb);
        Arc::clone(self)
    }

    /// The canonical "wire an operator" primitive: append `cb` to
    /// `self`'s (upstream's) `on_item`, and remove it by identity once
    /// `downstream`'s completion is ready.
    pub fn each_while_source<F>(self: &Arc<Self>, cb: F, downstream: &Arc<Source>)
    where
        F: FnMut(&Value) -> Result<()> + Send + 'static,
    {
        let id = self.add_item_callback(cb);
        let upstream = Arc::clone(self);
        downstream.completed.on_ready(move |_ready| {
            upstream.remove_item_callback(id);
        });
    }

    /// Deliver one item through the current snapshot of `on_item`.
    ///
    /// The callback list is swapped out of its mutex before dispatch so
    /// that a callback which synchronously finishes a downstream — which
    /// in turn removes *this* callback via `each_while_source`'s observer —
    /// does not re-enter the same mutex (`std::sync::Mutex` is not
    /// reentrant). Removals requested mid-dispatch are recorded and applied
    /// when the list is merged back.
    pub fn emit(self: &Arc<Self>, item: Value) -> Result<()> {
        if self.completed.is_ready() {
            return Err(ReactorError::AlreadyCompleted);
        }

        let mut callbacks = {
            let mut state = self.on_item.lock().unwrap();
            state.checked_out = true;
            std::mem::take(&mut state.callbacks)
        };

        let mut outcome = Ok(());
        for (_, cb) in callbacks.iter_mut() {
            if let Err(e) = cb(&item) {
                outcome = Err(e);
                break;
            }
        }

        {
            let mut state = self.on_item.lock().unwrap();
            let mut restored: Vec<_> = callbacks
                .into_iter()
                .filter(|(id, _)| !state.pending_removals.remove(id))
                .collect();
            restored.append(&mut state.callbacks);
            state.callbacks = restored;
            state.checked_out = false;
            // A cancellation cascading up from a sibling completing during
            // this dispatch may have settled `self` while its callbacks
            // were checked out; self-cleanup then cleared an empty vec and
            // this merge would otherwise resurrect the stale snapshot.
            if self.completed.is_ready() {
                state.callbacks.clear();
            }
        }

        if let Err(e) = outcome {
            tracing::warn!(label = %self.label, error = %e, "on_item callback raised; failing source");
            let failure = crate::completion::Failure::from(e.clone());
            let _ = self.completed.fail(failure.error, failure.tags);
            return Err(e);
        }
        Ok(())
    }

    /// Deliver each item of `items` in order, stopping at the first error.
    pub fn emit_all(self: &Arc<Self>, items: impl IntoIterator<Item = Value>) -> Result<()> {
        for item in items {
            self.emit(item)?;
        }
        Ok(())
    }

    /// Transition this source's completion to done.
    pub fn finish(self: &Arc<Self>) -> Result<()> {
        self.completed.done(Value::Null)
    }

    /// Transition this source's completion to done, carrying a value (used
    /// by aggregation terminators).
    pub fn finish_with(self: &Arc<Self>, value: Value) -> Result<()> {
        self.completed.done(value)
    }

    /// Transition this source's completion to failed.
    pub fn fail(self: &Arc<Self>, error: Value) -> Result<()> {
        self.completed.fail(error, Vec::new())
    }

    /// Transition this source's completion to cancelled.
    pub fn cancel(self: &Arc<Self>) -> Result<()> {
        self.completed.cancel()
    }

    /// `parent.describe() + "=>" + label + "(" + state + ")"`, with no
    /// `parent=>` prefix at the root.
    pub fn describe(&self) -> String {
        let state = if !self.completed.is_ready() {
            "pending"
        } else if self.completed.is_done() {
            "done"
        } else if self.completed.is_failed() {
            "failed"
        } else {
            "cancelled"
        };
        match self.parent.as_ref().and_then(Weak::upgrade) {
            Some(parent) => format!("{}=>{}({})", parent.describe(), self.label, state),
            None => format!("{}({})", self.label, state),
        }
    }

    /// This source's label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// This source's parent, if any (upgraded from the weak back-link).
    pub fn parent(&self) -> Option<Arc<Source>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Walk up to the root of this chain.
    pub fn root(self: &Arc<Self>) -> Arc<Source> {
        let mut current = Arc::clone(self);
        loop {
            match current.parent() {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// This source's completion handle.
    pub fn completed(&self) -> &Completion {
        &self.completed
    }

    /// Advisory pause flag; no effect on emission scheduling.
    pub fn pause(&self) {
        self.is_paused.store(true, Ordering::SeqCst);
    }

    /// Clear the advisory pause flag.
    pub fn resume(&self) {
        self.is_paused.store(false, Ordering::SeqCst);
    }

    /// Current advisory pause state.
    pub fn is_paused(&self) -> bool {
        self.is_paused.load(Ordering::SeqCst)
    }

    /// Install the deferred root action a factory uses to kick off
    /// emission once `get()` walks up to the root.
    pub fn set_on_get<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce(&Arc<Source>) + Send + 'static,
    {
        *self.on_get.lock().unwrap() = Some(Box::new(f));
    }

    /// Take the deferred root action, if any, leaving `None` behind so it
    /// runs at most once.
    pub fn take_on_get(self: &Arc<Self>) -> Option<OnGet> {
        self.on_get.lock().unwrap().take()
    }

    /// Number of children currently attached (diagnostic / test use).
    pub fn child_count(&self) -> usize {
        self.children.lock().unwrap().len()
    }

    /// Register an `encode_<kind>` extension on this source: a second-chance
    /// factory `encode`/`decode` fall back to when the process-wide codec
    /// registry has no entry for `kind`.
    pub fn register_encode_kind(&self, kind: impl Into<String>, factory: CodecFactory) {
        self.encode_extensions.lock().unwrap().insert(kind.into(), factory);
    }

    /// Register a `decode_<kind>` extension, the decode counterpart of
    /// [`Source::register_encode_kind`].
    pub fn register_decode_kind(&self, kind: impl Into<String>, factory: CodecFactory) {
        self.decode_extensions.lock().unwrap().insert(kind.into(), factory);
    }

    pub(crate) fn encode_extension(&self, kind: &str) -> Option<CodecFactory> {
        self.encode_extensions.lock().unwrap().get(kind).cloned()
    }

    pub(crate) fn decode_extension(&self, kind: &str) -> Option<CodecFactory> {
        self.decode_extensions.lock().unwrap().get(kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_delivers_to_registered_callback() {
        let root = Source::new("root");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        root.each(move |item| {
            s.lock().unwrap().push(item.clone());
            Ok(())
        });
        root.emit(Value::from(1)).unwrap();
        root.emit(Value::from(2)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn emit_after_completion_fails() {
        let root = Source::new("root");
        root.finish().unwrap();
        assert!(matches!(root.emit(Value::from(1)), Err(ReactorError::AlreadyCompleted)));
    }

    #[test]
    fn callback_error_fails_source_and_aborts_loop() {
        let root = Source::new("root");
        let calls = Arc::new(Mutex::new(0));
        let c1 = calls.clone();
        root.each(move |_| {
            *c1.lock().unwrap() += 1;
            Err(ReactorError::callback("boom", Value::from("nope")))
        });
        let c2 = calls.clone();
        root.each(move |_| {
            *c2.lock().unwrap() += 1;
            Ok(())
        });

        let err = root.emit(Value::from(1));
        assert!(err.is_err());
        assert_eq!(*calls.lock().unwrap(), 1, "second callback must not run after the first fails");
        assert!(root.completed().is_failed());
    }

    #[test]
    fn chained_cleanup_removes_callback_from_parent() {
        let root = Source::new("root");
        let child = root.chained("child");
        child.completed().done(Value::Null).unwrap();
        // After the child's completion settles, self-cleanup should have
        // removed it from the parent's children list.
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn parent_cancelled_when_last_child_terminates() {
        let root = Source::new("root");
        let child = root.chained("child");
        child.completed().cancel().unwrap();
        assert!(root.completed().is_cancelled());
    }

    #[test]
    fn parent_not_cancelled_if_already_ready() {
        let root = Source::new("root");
        let child = root.chained("child");
        root.finish().unwrap();
        child.completed().cancel().unwrap();
        assert!(root.completed().is_done());
    }

    #[test]
    fn each_while_source_removes_when_downstream_completes() {
        let upstream = Source::new("upstream");
        let downstream = upstream.chained("downstream");
        let seen = Arc::new(Mutex::new(0));
        let s = seen.clone();
        upstream.each_while_source(
            move |_| {
                *s.lock().unwrap() += 1;
                Ok(())
            },
            &downstream,
        );
        upstream.emit(Value::from(1)).unwrap();
        downstream.finish().unwrap();
        upstream.emit(Value::from(2)).unwrap();
        assert_eq!(*seen.lock().unwrap(), 1, "callback must not run after downstream completes");
    }

    #[test]
    fn removal_during_dispatch_is_honored() {
        // A callback that finishes its own downstream synchronously
        // (take(1)-style) must not leave a dangling callback behind.
        let upstream = Source::new("upstream");
        let downstream = upstream.chained("downstream");
        let downstream_for_cb = Arc::clone(&downstream);
        let seen = Arc::new(Mutex::new(0));
        let s = seen.clone();
        upstream.each_while_source(
            move |_| {
                *s.lock().unwrap() += 1;
                downstream_for_cb.finish().unwrap();
                Ok(())
            },
            &downstream,
        );
        upstream.emit(Value::from(1)).unwrap();
        upstream.emit(Value::from(2)).unwrap();
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn describe_chains_labels_and_state() {
        let root = Source::new("root");
        let child = root.chained("mapped");
        assert_eq!(child.describe(), "root(pending)=>mapped(pending)");
        child.finish().unwrap();
        assert_eq!(child.describe(), "root(pending)=>mapped(done)");
    }
}
