//! Operators out of scope for this core: `debounce` is deferred to a
//! timing-capable extension and raises
//! [`crate::error::ReactorError::Unimplemented`] rather than silently
//! accepting and ignoring the call.
//!
//! Also a small diagnostic/convenience surface with no dedicated operator
//! subsection of its own: `then`/`r#else` are `on_ready` narrowed to one
//! terminal branch, and `print`/`say` are `each` sinks that format and
//! write an item, differing the way Perl's own `print` (no trailing
//! newline) and `say` (always one) differ.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ReactorError, Result};
use crate::source::Source;
use crate::value_ext::as_text;

impl Source {
    /// Not implemented by this port: timer-based operators require a
    /// timing-capable extension outside this crate's scope.
    pub fn debounce(self: &Arc<Self>, _delay: Duration) -> Result<Arc<Source>> {
        Err(ReactorError::Unimplemented("debounce"))
    }

    /// Register `cb` to run once, with the done value, when this source's
    /// completion settles `Done` — `on_ready` narrowed to the success
    /// branch.
    pub fn then<F>(self: &Arc<Self>, cb: F) -> Arc<Source>
    where
        F: FnOnce(&serde_json::Value) + Send + 'static,
    {
        self.completed().on_ready(move |ready| {
            if let crate::completion::Ready::Done(value) = ready {
                cb(value);
            }
        });
        Arc::clone(self)
    }

    /// Register `cb` to run once, with the failure payload, when this
    /// source's completion settles `Failed` — the `then` counterpart for
    /// the failure branch. Named `r#else` because `else` is a
    /// reserved word.
    pub fn r#else<F>(self: &Arc<Self>, cb: F) -> Arc<Source>
    where
        F: FnOnce(&crate::completion::Failure) + Send + 'static,
    {
        self.completed().on_ready(move |ready| {
            if let crate::completion::Ready::Failed(failure) = ready {
                cb(failure);
            }
        });
        Arc::clone(self)
    }

    /// Sink: write each item to stdout with no trailing newline (Perl
    /// `print` semantics), then pass it through untouched.
    pub fn print(self: &Arc<Self>) -> Arc<Source> {
        self.each(|item| {
            print!("{}", as_text(item));
            Ok(())
        })
    }

    /// Sink: write each item to stdout followed by a newline (Perl `say`
    /// semantics), then pass it through untouched.
    pub fn say(self: &Arc<Self>) -> Arc<Source> {
        self.each(|item| {
            println!("{}", as_text(item));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Mutex;

    #[test]
    fn debounce_raises_unimplemented() {
        let root = Source::new("root");
        let err = root.debounce(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, ReactorError::Unimplemented("debounce")));
    }

    #[test]
    fn then_fires_only_on_done_with_value() {
        let root = Source::new("root");
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        root.then(move |v| *s.lock().unwrap() = Some(v.clone()));
        root.finish_with(Value::from(7)).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(Value::from(7)));
    }

    #[test]
    fn then_does_not_fire_on_failure() {
        let root = Source::new("root");
        let fired = Arc::new(Mutex::new(false));
        let f = fired.clone();
        root.then(move |_| *f.lock().unwrap() = true);
        root.fail(Value::from("boom")).unwrap();
        assert!(!*fired.lock().unwrap());
    }

    #[test]
    fn else_fires_only_on_failure() {
        let root = Source::new("root");
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        root.r#else(move |f| *s.lock().unwrap() = Some(f.error.clone()));
        root.fail(Value::from("boom")).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(Value::from("boom")));
    }

    #[test]
    fn else_does_not_fire_on_done() {
        let root = Source::new("root");
        let fired = Arc::new(Mutex::new(false));
        let f = fired.clone();
        root.r#else(move |_| *f.lock().unwrap() = true);
        root.finish().unwrap();
        assert!(!*fired.lock().unwrap());
    }
}
