//! The blocking bridge: a synchronous `get`/`await` that drives a chain to
//! completion from ordinary, non-reactive code.
//!
//! This is the engine's only suspension point — everything
//! else in the crate runs to completion synchronously on the calling
//! thread.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::completion::{Failure, Ready};
use crate::source::Source;

/// Block the calling thread until `source` completes, returning the items
/// observed before termination.
///
/// Collects a sink via `each`, walks up to the root and invokes its
/// deferred `on_get` thunk (if any — an already-driven chain, or one built
/// directly on `emit`, has none), then blocks on `source`'s own completion.
/// On failure, returns the upstream's failure payload; on done, returns the
/// collected items. On cancellation, returns the same partial collection
/// with no error — "the returned list from `as_list` is the items observed
/// before cancellation" applies here too.
pub fn get(source: &Arc<Source>) -> Result<Vec<Value>, Failure> {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();
    source.each(move |item| {
        sink.lock().unwrap().push(item.clone());
        Ok(())
    });

    if let Some(on_get) = source.root().take_on_get() {
        let root = source.root();
        on_get(&root);
    }

    match source.completed().await_ready() {
        Ready::Done(_) => Ok(collected.lock().unwrap().clone()),
        Ready::Cancelled => Ok(collected.lock().unwrap().clone()),
        Ready::Failed(failure) => Err(failure),
    }
}

/// Block until `source` completes without collecting items — the
/// non-collecting counterpart used when only the terminal state matters.
pub fn await_completion(source: &Arc<Source>) -> Result<Option<Value>, Failure> {
    if let Some(on_get) = source.root().take_on_get() {
        let root = source.root();
        on_get(&root);
    }
    match source.completed().await_ready() {
        Ready::Done(value) => Ok(Some(value)),
        Ready::Cancelled => Ok(None),
        Ready::Failed(failure) => Err(failure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::from_sequence;

    #[test]
    fn get_collects_items_and_drives_root() {
        let root = from_sequence("seq", vec![Value::from(1), Value::from(2)]);
        let items = get(&root).unwrap();
        assert_eq!(items, vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn get_on_failed_source_returns_failure() {
        let root = Source::new("root");
        root.fail(Value::from("boom")).unwrap();
        let err = get(&root).unwrap_err();
        assert_eq!(err.error, Value::from("boom"));
    }

    #[test]
    fn get_on_cancelled_source_returns_partial_collection() {
        let root = Source::new("root");
        root.emit(Value::from(1)).unwrap();
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = collected.clone();
        root.each(move |item| {
            sink.lock().unwrap().push(item.clone());
            Ok(())
        });
        root.emit(Value::from(2)).unwrap();
        root.cancel().unwrap();
        let items = get(&root).unwrap();
        assert_eq!(items, vec![Value::from(2)]);
    }
}
