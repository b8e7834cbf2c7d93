//! `as_list`, `as_arrayref`, `as_string` — the only operators that return
//! a bare [`Completion`] instead of a chained [`Source`].
//!
//! `as_arrayref` is identical to `as_list` in this port: the source
//! material's array/list distinction is a host-language box-vs-reference
//! distinction that collapses once items live in an owned `Value::Array`.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::completion::{Completion, Ready};
use crate::source::Source;
use crate::value_ext::as_text;

impl Source {
    fn collect_into<F>(self: &Arc<Self>, finalize: F) -> Completion
    where
        F: Fn(Vec<Value>) -> Value + Send + 'static,
    {
        let result = Completion::new();
        let buffer: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let buf_in = Arc::clone(&buffer);
        self.each(move |item| {
            buf_in.lock().unwrap().push(item.clone());
            Ok(())
        });

        let sink = result.clone();
        self.completed().on_ready(move |ready| {
            match ready.clone() {
                Ready::Done(_) => {
                    let items = buffer.lock().unwrap().clone();
                    let _ = sink.done(finalize(items));
                }
                Ready::Failed(failure) => {
                    let _ = sink.fail(failure.error, failure.tags);
                }
                Ready::Cancelled => {
                    let items = buffer.lock().unwrap().clone();
                    let _ = sink.done(finalize(items));
                }
            }
        });
        result
    }

    /// A completion that, on upstream done, carries every observed item as
    /// an array. Cancellation also resolves with the partial list of items
    /// observed before cancellation, rather than propagating cancellation.
    pub fn as_list(self: &Arc<Self>) -> Completion {
        self.collect_into(Value::Array)
    }

    /// Identical to [`Source::as_list`] in this port.
    pub fn as_arrayref(self: &Arc<Self>) -> Completion {
        self.as_list()
    }

    /// A completion that, on upstream done, carries every observed item's
    /// text, concatenated.
    pub fn as_string(self: &Arc<Self>) -> Completion {
        self.collect_into(|items| Value::String(items.iter().map(as_text).collect::<Vec<_>>().join("")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn as_list_carries_all_items_on_done() {
        let root = Source::new("root");
        let result = root.as_list();
        root.emit_all([Value::from(1), Value::from(2)]).unwrap();
        root.finish().unwrap();
        assert_eq!(result.await_ready(), Ready::Done(Value::Array(vec![Value::from(1), Value::from(2)])));
    }

    #[test]
    fn as_string_concatenates_text() {
        let root = Source::new("root");
        let result = root.as_string();
        root.emit_all([Value::from("a"), Value::from("b"), Value::from("c")]).unwrap();
        root.finish().unwrap();
        assert_eq!(result.await_ready(), Ready::Done(Value::String("abc".to_string())));
    }

    #[test]
    fn as_list_on_cancellation_carries_partial_items() {
        let root = Source::new("root");
        root.emit(Value::from(1)).unwrap();
        let result = root.as_list();
        root.emit(Value::from(2)).unwrap();
        root.cancel().unwrap();
        assert_eq!(result.await_ready(), Ready::Done(Value::Array(vec![Value::from(1), Value::from(2)])));
    }
}
