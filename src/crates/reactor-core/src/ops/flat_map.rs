//! `flat_map`: for each upstream item, evaluate a mapping function that may
//! yield either a list of values to splice in directly, or a sub-source
//! whose own emissions are spliced in and whose completion is tracked
//! before this operator's downstream can finish.
//!
//! Grounded on the same "track N outstanding completions, finish when the
//! last one settles" idiom as [`super::combine`]'s `apply`/`each_as_source`
//! — a sub-source created after upstream completes is still waited on, so
//! the remaining-count starts at 1 (for upstream itself) and is incremented
//! for every sub-source as it is discovered, never pre-declared.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::completion::Ready;
use crate::source::Source;

/// What a `flat_map` mapping function produced for one upstream item.
pub enum FlatMapped {
    /// Emit each element of this list, in order.
    List(Vec<Value>),
    /// Subscribe to this source: splice its items in as they arrive, and
    /// hold downstream completion open until it, too, finishes.
    Source(Arc<Source>),
}

fn track_subsource(sub: &Arc<Source>, downstream: &Arc<Source>, remaining: &Arc<AtomicUsize>) {
    let sink = Arc::clone(downstream);
    sub.each_while_source(move |item| sink.emit(item.clone()), downstream);

    let sink = Arc::clone(downstream);
    let remaining = Arc::clone(remaining);
    sub.completed().on_ready(move |ready| {
        if sink.completed().is_ready() {
            return;
        }
        if let Ready::Failed(failure) = ready.clone() {
            let _ = sink.completed().fail(failure.error, failure.tags);
            return;
        }
        if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = sink.finish();
        }
    });
}

impl Source {
    /// For each upstream item `x`, evaluate `f(x)`. A [`FlatMapped::List`]
    /// splices its elements into the downstream in order; a
    /// [`FlatMapped::Source`] is subscribed to and tracked. The downstream
    /// completes once upstream and every tracked sub-source have completed.
    pub fn flat_map<F>(self: &Arc<Self>, mut f: F) -> Arc<Source>
    where
        F: FnMut(&Value) -> crate::error::Result<FlatMapped> + Send + 'static,
    {
        let downstream = self.chained("flat_map");
        let remaining = Arc::new(AtomicUsize::new(1));

        let sink = Arc::clone(&downstream);
        let remaining_for_items = Arc::clone(&remaining);
        let downstream_for_tracking = Arc::clone(&downstream);
        self.each_while_source(
            move |item| match f(item)? {
                FlatMapped::List(values) => {
                    for value in values {
                        sink.emit(value)?;
                    }
                    Ok(())
                }
                FlatMapped::Source(sub) => {
                    remaining_for_items.fetch_add(1, Ordering::SeqCst);
                    track_subsource(&sub, &downstream_for_tracking, &remaining_for_items);
                    Ok(())
                }
            },
            &downstream,
        );

        let sink = Arc::clone(&downstream);
        self.completed().on_ready(move |ready| {
            if sink.completed().is_ready() {
                return;
            }
            match ready.clone() {
                Ready::Failed(failure) => {
                    let _ = sink.completed().fail(failure.error, failure.tags);
                }
                Ready::Cancelled => {
                    // Upstream cancelled; still wait for any outstanding
                    // sub-sources before settling downstream the same way.
                    if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                        let _ = sink.cancel();
                    }
                }
                Ready::Done(value) => {
                    if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                        let _ = sink.finish_with(value);
                    }
                }
            }
        });
        downstream
    }
}
