//! `some` and `every`: short-circuiting boolean aggregation, modeled as a
//! two-state machine (`undecided` → `decided`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::completion::Ready;
use crate::source::Source;

impl Source {
    /// Emit `1` and finish as soon as `pred` matches an item; emit `0` and
    /// finish if upstream completes with no match.
    pub fn some<F>(self: &Arc<Self>, mut pred: F) -> Arc<Source>
    where
        F: FnMut(&Value) -> bool + Send + 'static,
    {
        let downstream = self.chained("some");
        let decided = Arc::new(AtomicBool::new(false));

        let sink = Arc::clone(&downstream);
        let decided_item = Arc::clone(&decided);
        self.each_while_source(
            move |item| {
                if pred(item) {
                    decided_item.store(true, Ordering::SeqCst);
                    sink.emit(Value::from(1))?;
                    let _ = sink.finish();
                }
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
                    if !decided.load(Ordering::SeqCst) {
                        let _ = sink.emit(Value::from(0));
                        let _ = sink.finish();
                    }
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

    /// Emit `0` and finish as soon as `pred` fails to match an item; emit
    /// `1` and finish if upstream completes with every item matching.
    pub fn every<F>(self: &Arc<Self>, mut pred: F) -> Arc<Source>
    where
        F: FnMut(&Value) -> bool + Send + 'static,
    {
        let downstream = self.chained("every");
        let decided = Arc::new(AtomicBool::new(false));

        let sink = Arc::clone(&downstream);
        let decided_item = Arc::clone(&decided);
        self.each_while_source(
            move |item| {
                if !pred(item) {
                    decided_item.store(true, Ordering::SeqCst);
                    sink.emit(Value::from(0))?;
                    let _ = sink.finish();
                }
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
                    if !decided.load(Ordering::SeqCst) {
                        let _ = sink.emit(Value::from(1));
                        let _ = sink.finish();
                    }
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::get;
    use crate::factory::from_sequence;

    fn seq(items: &[i64]) -> Arc<Source> {
        from_sequence("seq", items.iter().map(|v| Value::from(*v)).collect())
    }

    #[test]
    fn some_emits_one_on_first_match() {
        let root = seq(&[1, 2, 3, 4]);
        let found = root.some(|v| v.as_i64().unwrap() == 3);
        assert_eq!(get(&found).unwrap(), vec![Value::from(1)]);
    }

    #[test]
    fn some_emits_zero_when_nothing_matches() {
        let root = seq(&[1, 2, 3]);
        let found = root.some(|v| v.as_i64().unwrap() == 99);
        assert_eq!(get(&found).unwrap(), vec![Value::from(0)]);
    }

    #[test]
    fn every_emits_zero_on_first_mismatch() {
        let root = seq(&[2, 4, 5, 8]);
        let all_even = root.every(|v| v.as_i64().unwrap() % 2 == 0);
        assert_eq!(get(&all_even).unwrap(), vec![Value::from(0)]);
    }

    #[test]
    fn every_emits_one_when_all_match() {
        let root = seq(&[2, 4, 6]);
        let all_even = root.every(|v| v.as_i64().unwrap() % 2 == 0);
        assert_eq!(get(&all_even).unwrap(), vec![Value::from(1)]);
    }
}
