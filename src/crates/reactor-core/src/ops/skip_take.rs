//! `skip`, `skip_last`, `take`.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;

use super::forward_terminal;
use crate::source::Source;

impl Source {
    /// Drop the first `n` items, then emit everything after.
    pub fn skip(self: &Arc<Self>, n: u64) -> Arc<Source> {
        let downstream = self.chained(format!("skip({n})"));
        let sink = Arc::clone(&downstream);
        let mut remaining = n;
        self.each_while_source(
            move |item| {
                if remaining > 0 {
                    remaining -= 1;
                    return Ok(());
                }
                sink.emit(item.clone())
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
        downstream
    }

    /// Emit every item except the last `n`; buffered residue shorter than
    /// `n` is discarded on completion.
    pub fn skip_last(self: &Arc<Self>, n: u64) -> Arc<Source> {
        let downstream = self.chained(format!("skip_last({n})"));
        let sink = Arc::clone(&downstream);
        let capacity = n as usize + 1;
        let mut buffer: VecDeque<Value> = VecDeque::with_capacity(capacity);
        self.each_while_source(
            move |item| {
                buffer.push_back(item.clone());
                if buffer.len() > n as usize {
                    let front = buffer.pop_front().expect("just checked len > n");
                    sink.emit(front)?;
                }
                Ok(())
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
        downstream
    }

    /// Emit at most the first `n` items, then finish. `n == 0` yields an
    /// immediately-finished source emitting nothing.
    pub fn take(self: &Arc<Self>, n: u64) -> Arc<Source> {
        let downstream = self.chained(format!("take({n})"));
        if n == 0 {
            let _ = downstream.finish();
            return downstream;
        }
        let sink = Arc::clone(&downstream);
        let mut remaining = n;
        self.each_while_source(
            move |item| {
                sink.emit(item.clone())?;
                remaining -= 1;
                if remaining == 0 {
                    let _ = sink.finish();
                }
                Ok(())
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
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
    fn skip_then_take_equals_slice() {
        let root = seq(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let sliced = root.skip(3).take(4);
        assert_eq!(
            get(&sliced).unwrap(),
            vec![Value::from(3), Value::from(4), Value::from(5), Value::from(6)]
        );
    }

    #[test]
    fn skip_last_drops_trailing_n_items() {
        let root = seq(&[1, 2, 3, 4, 5]);
        let trimmed = root.skip_last(2);
        assert_eq!(get(&trimmed).unwrap(), vec![Value::from(1), Value::from(2), Value::from(3)]);
    }

    #[test]
    fn skip_last_emits_nothing_when_shorter_than_n() {
        let root = seq(&[1, 2]);
        let trimmed = root.skip_last(5);
        assert_eq!(get(&trimmed).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn take_zero_finishes_immediately_with_no_items() {
        let root = seq(&[1, 2, 3]);
        let taken = root.take(0);
        assert_eq!(get(&taken).unwrap(), Vec::<Value>::new());
        assert!(taken.completed().is_done());
    }

    #[test]
    fn take_n_stops_after_n_items_even_if_upstream_emits_more() {
        let root = seq(&[1, 2, 3, 4, 5]);
        let taken = root.take(2);
        assert_eq!(get(&taken).unwrap(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn take_n_with_fewer_upstream_items_emits_all_and_forwards_done() {
        let root = seq(&[1, 2]);
        let taken = root.take(5);
        assert_eq!(get(&taken).unwrap(), vec![Value::from(1), Value::from(2)]);
        assert!(taken.completed().is_done());
    }
}
