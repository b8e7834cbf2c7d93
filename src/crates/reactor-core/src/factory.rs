//! Root-source factory entry points.
//!
//! Concrete I/O mechanics (actually reading a file, actually resolving a
//! future) are external collaborators — this module defines the
//! recognized input shapes and the `on_get` thunk each wires up, not an
//! I/O implementation.

use std::sync::Arc;

use serde_json::Value;

use crate::completion::Ready;
use crate::error::ReactorError;
use crate::source::Source;

/// Byte-oriented input a reader-backed root can pull from. The engine reads
/// fixed 4096-byte chunks; the mechanics of producing those bytes (file,
/// socket, in-memory buffer) are up to the implementor.
pub trait ByteReader: Send {
    /// Read up to `max_len` bytes. `Ok(None)` signals end of stream.
    fn read_chunk(&mut self, max_len: usize) -> std::io::Result<Option<Vec<u8>>>;
}

/// The chunk size `from_reader` requests on each read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// The recognized input shapes for `from`.
pub enum FromInput {
    /// An in-memory ordered sequence: emits each element then finishes.
    Sequence(Vec<Value>),
    /// A readable byte source: emits 4096-byte chunks then finishes on end.
    Reader(Box<dyn ByteReader>),
    /// An existing completion handle: bridges its terminal state into a
    /// fresh source.
    Completion(crate::completion::Completion),
}

/// Build a root source from one of the recognized input shapes, or fail
/// synchronously with an "unsupported input" error.
pub fn from(label: impl Into<String>, input: FromInput) -> crate::error::Result<Arc<Source>> {
    let label = label.into();
    match input {
        FromInput::Sequence(items) => Ok(from_sequence(label, items)),
        FromInput::Reader(reader) => Ok(from_reader(label, reader)),
        FromInput::Completion(handle) => Ok(from_completion(label, handle)),
    }
}

/// A root source whose `on_get` emits every element of `items` in order,
/// then finishes.
pub fn from_sequence(label: impl Into<String>, items: Vec<Value>) -> Arc<Source> {
    let root = Source::new(label);
    root.set_on_get(move |root| {
        for item in items {
            if root.emit(item).is_err() {
                return;
            }
        }
        let _ = root.finish();
    });
    root
}

/// A root source whose `on_get` reads fixed-size chunks from `reader` until
/// end-of-stream, then finishes.
pub fn from_reader(label: impl Into<String>, mut reader: Box<dyn ByteReader>) -> Arc<Source> {
    let root = Source::new(label);
    root.set_on_get(move |root| loop {
        match reader.read_chunk(READ_CHUNK_SIZE) {
            Ok(Some(bytes)) => {
                let chunk = Value::String(String::from_utf8_lossy(&bytes).into_owned());
                if root.emit(chunk).is_err() {
                    return;
                }
            }
            Ok(None) => {
                let _ = root.finish();
                return;
            }
            Err(e) => {
                let _ = root.fail(Value::String(e.to_string()));
                return;
            }
        }
    });
    root
}

/// A root source that bridges an existing completion handle: when `handle`
/// transitions, the new source finishes (cancelled or done-with-no-value),
/// emits the produced value then finishes (done-with-value), or fails
/// (failed).
pub fn from_completion(label: impl Into<String>, handle: crate::completion::Completion) -> Arc<Source> {
    let root = Source::new(label);
    let sink = Arc::clone(&root);
    handle.on_ready(move |ready| {
        let _ = match ready.clone() {
            Ready::Done(Value::Null) => sink.finish(),
            Ready::Done(value) => sink.emit(value).and_then(|_| sink.finish()),
            Ready::Failed(failure) => sink.fail(failure.error),
            Ready::Cancelled => sink.cancel(),
        };
    });
    root
}

/// The "anything else" branch of `from`: fails synchronously rather than
/// constructing a source.
pub fn unsupported(description: impl Into<String>) -> crate::error::Result<Arc<Source>> {
    Err(ReactorError::UnsupportedInput(description.into()))
}

/// A root source that finishes immediately, emitting nothing — the
/// zero-element case of [`from_sequence`].
pub fn empty(label: impl Into<String>) -> Arc<Source> {
    let root = Source::new(label);
    root.set_on_get(|root| {
        let _ = root.finish();
    });
    root
}

/// A root source with no `on_get` action: `get()` on it blocks forever
/// unless something external drives its completion directly.
pub fn never(label: impl Into<String>) -> Arc<Source> {
    Source::new(label)
}

/// A root source that fails as soon as it is driven, carrying `error`.
pub fn throw(label: impl Into<String>, error: Value) -> Arc<Source> {
    let root = Source::new(label);
    root.set_on_get(move |root| {
        let _ = root.fail(error);
    });
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::get;

    #[test]
    fn sequence_factory_emits_then_finishes() {
        let root = from_sequence("seq", vec![Value::from(1), Value::from(2), Value::from(3)]);
        let items = get(&root).unwrap();
        assert_eq!(items, vec![Value::from(1), Value::from(2), Value::from(3)]);
    }

    struct VecReader {
        chunks: Vec<Vec<u8>>,
        idx: usize,
    }

    impl ByteReader for VecReader {
        fn read_chunk(&mut self, _max_len: usize) -> std::io::Result<Option<Vec<u8>>> {
            if self.idx >= self.chunks.len() {
                return Ok(None);
            }
            let chunk = self.chunks[self.idx].clone();
            self.idx += 1;
            Ok(Some(chunk))
        }
    }

    #[test]
    fn reader_factory_emits_chunks_then_finishes() {
        let reader = VecReader {
            chunks: vec![b"hello ".to_vec(), b"world".to_vec()],
            idx: 0,
        };
        let root = from_reader("reader", Box::new(reader));
        let items = get(&root).unwrap();
        assert_eq!(items, vec![Value::from("hello "), Value::from("world")]);
    }

    #[test]
    fn completion_factory_emits_done_value_then_finishes() {
        let handle = crate::completion::Completion::new();
        let root = from_completion("future", handle.clone());
        handle.done(Value::from(42)).unwrap();
        let items = get(&root).unwrap();
        assert_eq!(items, vec![Value::from(42)]);
    }

    #[test]
    fn completion_factory_propagates_failure() {
        let handle = crate::completion::Completion::new();
        let root = from_completion("future", handle.clone());
        handle.fail(Value::from("boom"), vec![]).unwrap();
        let err = get(&root).unwrap_err();
        assert_eq!(err.error, Value::from("boom"));
    }

    #[test]
    fn empty_finishes_with_no_items() {
        let root = empty("nothing");
        let items = get(&root).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn never_has_no_on_get_action() {
        let root = never("forever");
        assert!(root.take_on_get().is_none());
    }

    #[test]
    fn throw_fails_as_soon_as_driven() {
        let root = throw("boom", Value::from("nope"));
        let err = get(&root).unwrap_err();
        assert_eq!(err.error, Value::from("nope"));
    }
}
