//! Wiring shared by every operator: forwarding an upstream's terminal state
//! onto a freshly-chained downstream.

use std::sync::Arc;

use crate::completion::Ready;
use crate::source::Source;

/// Register an observer on `upstream`'s completion that propagates its
/// terminal state onto `downstream`, unless `downstream` has already
/// reached a terminal state of its own (e.g. `take` finishing early).
pub(crate) fn forward_terminal(upstream: &Arc<Source>, downstream: &Arc<Source>) {
    let sink = Arc::clone(downstream);
    upstream.completed().on_ready(move |ready| {
        if sink.completed().is_ready() {
            return;
        }
        let _ = match ready.clone() {
            Ready::Done(value) => sink.finish_with(value),
            Ready::Failed(failure) => sink.completed().fail(failure.error, failure.tags),
            Ready::Cancelled => sink.cancel(),
        };
    });
}
