//! `filter`.
//!
//! The source material's `filter` accepts either a callable predicate or a
//! `key => matcher` pair; a matcher is equality, a regex, a callable, or a
//! key/value structural map. A statically-typed port models this as a
//! tagged variant rather than runtime shape-sniffing.

use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use super::forward_terminal;
use crate::source::Source;
use crate::value_ext::as_text;

/// How `filter` decides whether to pass an item through.
pub enum FilterSpec {
    /// An arbitrary predicate over the whole item.
    Predicate(Box<dyn FnMut(&Value) -> bool + Send>),
    /// `item[key]` must equal `value`.
    Equality { key: String, value: Value },
    /// `item[key]`, coerced to text, must match `pattern`.
    Regex { key: String, pattern: Regex },
    /// Every `key => matcher` pair must hold, applied structurally against
    /// an object item.
    Structural(Vec<(String, Box<dyn Fn(&Value) -> bool + Send>)>),
}

impl FilterSpec {
    fn matches(&mut self, item: &Value) -> bool {
        match self {
            FilterSpec::Predicate(f) => f(item),
            FilterSpec::Equality { key, value } => item.get(key) == Some(value),
            FilterSpec::Regex { key, pattern } => item
                .get(key)
                .map(|v| pattern.is_match(&as_text(v)))
                .unwrap_or(false),
            FilterSpec::Structural(matchers) => matchers
                .iter()
                .all(|(key, matcher)| item.get(key).map(|v| matcher(v)).unwrap_or(false)),
        }
    }
}

impl Source {
    /// Emit `x` iff it satisfies `spec`.
    pub fn filter(self: &Arc<Self>, mut spec: FilterSpec) -> Arc<Source> {
        let downstream = self.chained("filter");
        let sink = Arc::clone(&downstream);
        self.each_while_source(
            move |item| {
                if spec.matches(item) {
                    sink.emit(item.clone())
                } else {
                    Ok(())
                }
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
        downstream
    }

    /// Convenience: `filter` with a plain predicate closure.
    pub fn filter_fn<F>(self: &Arc<Self>, f: F) -> Arc<Source>
    where
        F: FnMut(&Value) -> bool + Send + 'static,
    {
        self.filter(FilterSpec::Predicate(Box::new(f)))
    }
}
