//! `with_index`, `distinct`, `distinct_until_changed`.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use super::forward_terminal;
use crate::source::Source;
use crate::value_ext::dedup_key;

impl Source {
    /// Emit `[x, i]` with `i` starting at 0 and incrementing per item.
    pub fn with_index(self: &Arc<Self>) -> Arc<Source> {
        let downstream = self.chained("with_index");
        let sink = Arc::clone(&downstream);
        let mut index: i64 = 0;
        self.each_while_source(
            move |item| {
                let pair = Value::Array(vec![item.clone(), Value::from(index)]);
                index += 1;
                sink.emit(pair)
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
        downstream
    }

    /// Emit `x` iff it has not been emitted before. Absence (`null`) is
    /// tracked by a dedicated one-shot latch rather than the hash set, so a
    /// `null` compares equal only to another `null`, never to the string
    /// `"null"`.
    pub fn distinct(self: &Arc<Self>) -> Arc<Source> {
        let downstream = self.chained("distinct");
        let sink = Arc::clone(&downstream);
        let mut seen: HashSet<String> = HashSet::new();
        let mut seen_null = false;
        self.each_while_source(
            move |item| {
                if item.is_null() {
                    if seen_null {
                        return Ok(());
                    }
                    seen_null = true;
                } else if !seen.insert(dedup_key(item)) {
                    return Ok(());
                }
                sink.emit(item.clone())
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
        downstream
    }

    /// Emit `x` iff it is the first item, or differs from the immediately
    /// preceding item by string-equality. Absence is tracked distinctly
    /// from "no previous item yet", so the very first item always emits
    /// even if it is `null`.
    pub fn distinct_until_changed(self: &Arc<Self>) -> Arc<Source> {
        let downstream = self.chained("distinct_until_changed");
        let sink = Arc::clone(&downstream);
        let mut previous: Option<String> = None;
        self.each_while_source(
            move |item| {
                let key = dedup_key(item);
                if previous.as_deref() == Some(key.as_str()) {
                    return Ok(());
                }
                previous = Some(key);
                sink.emit(item.clone())
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
        downstream
    }
}
