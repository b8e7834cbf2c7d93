//! Text/byte operators with residue state: `split`, `by_line`, `chunksize`,
//! `extract_all`.
//!
//! Chunked text is carried as `Value::String` throughout this engine (see
//! [`crate::codec`]'s module doc); these operators buffer and slice on
//! `char` boundaries rather than raw bytes as a consequence.

use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};

use super::forward_terminal;
use crate::error::{ReactorError, Result};
use crate::source::Source;
use crate::value_ext::as_text;

impl Source {
    /// Emit each fragment of splitting `x` on `delim`; with no `delim`,
    /// split between every character.
    pub fn split(self: &Arc<Self>, delim: Option<&str>) -> Arc<Source> {
        let delim = delim.map(str::to_string);
        let downstream = self.chained("split");
        let sink = Arc::clone(&downstream);
        self.each_while_source(
            move |item| {
                let text = as_text(item);
                let fragments: Vec<String> = match &delim {
                    Some(d) if !d.is_empty() => text.split(d.as_str()).map(str::to_string).collect(),
                    _ => text.chars().map(|c| c.to_string()).collect(),
                };
                for fragment in fragments {
                    sink.emit(Value::String(fragment))?;
                }
                Ok(())
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
        downstream
    }

    /// Buffer text and emit each complete line (text up to and including
    /// `delim`, with `delim` stripped); residue is discarded on completion.
    pub fn by_line(self: &Arc<Self>, delim: Option<&str>) -> Arc<Source> {
        let delim = delim.unwrap_or("\n").to_string();
        let downstream = self.chained(format!("by_line({delim:?})"));
        let sink = Arc::clone(&downstream);
        let mut residue = String::new();
        self.each_while_source(
            move |item| {
                residue.push_str(&as_text(item));
                while let Some(pos) = residue.find(delim.as_str()) {
                    let line: String = residue.drain(..pos + delim.len()).collect();
                    let line = &line[..line.len() - delim.len()];
                    sink.emit(Value::String(line.to_string()))?;
                }
                Ok(())
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
        downstream
    }

    /// Buffer text and emit successive chunks of exactly `n` characters;
    /// residue shorter than `n` is discarded on completion. `n` must be
    /// greater than zero; this is a construction-time domain error, not a
    /// completion transition, the same contract `encode`/`decode` honor for
    /// an unrecognized codec kind.
    pub fn chunksize(self: &Arc<Self>, n: usize) -> Result<Arc<Source>> {
        if n == 0 {
            return Err(ReactorError::UnsupportedArgument(format!(
                "chunksize requires n > 0, got {n}"
            )));
        }
        let downstream = self.chained(format!("chunksize({n})"));
        let sink = Arc::clone(&downstream);
        let mut buffer = String::new();
        self.each_while_source(
            move |item| {
                buffer.push_str(&as_text(item));
                while buffer.chars().count() >= n {
                    let chunk: String = buffer.chars().take(n).collect();
                    let rest: String = buffer.chars().skip(n).collect();
                    buffer = rest;
                    sink.emit(Value::String(chunk))?;
                }
                Ok(())
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
        Ok(downstream)
    }

    /// Repeatedly apply `pattern` against each item's text with advancing
    /// position; emit an object of named capture groups per match.
    pub fn extract_all(self: &Arc<Self>, pattern: Regex) -> Arc<Source> {
        let downstream = self.chained("extract_all");
        let sink = Arc::clone(&downstream);
        self.each_while_source(
            move |item| {
                let text = as_text(item);
                for captures in pattern.captures_iter(&text) {
                    let mut obj = Map::new();
                    for name in pattern.capture_names().flatten() {
                        if let Some(m) = captures.name(name) {
                            obj.insert(name.to_string(), Value::String(m.as_str().to_string()));
                        } else {
                            obj.insert(name.to_string(), Value::Null);
                        }
                    }
                    sink.emit(Value::Object(obj))?;
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

    #[test]
    fn split_on_delimiter_emits_fragments() {
        let root = from_sequence("seq", vec![Value::from("a,b,c")]);
        let parts = root.split(Some(","));
        assert_eq!(get(&parts).unwrap(), vec![Value::from("a"), Value::from("b"), Value::from("c")]);
    }

    #[test]
    fn split_with_no_delimiter_splits_every_character() {
        let root = from_sequence("seq", vec![Value::from("abc")]);
        let parts = root.split(None);
        assert_eq!(get(&parts).unwrap(), vec![Value::from("a"), Value::from("b"), Value::from("c")]);
    }

    #[test]
    fn by_line_splits_on_delimiter_and_drops_residue() {
        let root = from_sequence("seq", vec![Value::from("ab\ncd\nef")]);
        let lines = root.by_line(Some("\n"));
        assert_eq!(get(&lines).unwrap(), vec![Value::from("ab"), Value::from("cd")]);
    }

    #[test]
    fn by_line_buffers_across_multiple_items() {
        let root = from_sequence("seq", vec![Value::from("ab\ncd"), Value::from("\nef")]);
        let lines = root.by_line(Some("\n"));
        assert_eq!(get(&lines).unwrap(), vec![Value::from("ab"), Value::from("cd")]);
    }

    #[test]
    fn chunksize_emits_fixed_length_chunks_and_drops_residue() {
        let root = from_sequence("seq", vec![Value::from("abcdefg")]);
        let chunks = root.chunksize(3).unwrap();
        assert_eq!(get(&chunks).unwrap(), vec![Value::from("abc"), Value::from("def")]);
    }

    #[test]
    fn chunksize_emits_nothing_when_shorter_than_n() {
        let root = from_sequence("seq", vec![Value::from("ab")]);
        let chunks = root.chunksize(3).unwrap();
        assert_eq!(get(&chunks).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn chunksize_zero_is_rejected_at_construction() {
        let root = from_sequence("seq", vec![Value::from("abc")]);
        let err = root.chunksize(0).unwrap_err();
        assert!(matches!(err, ReactorError::UnsupportedArgument(_)));
    }

    #[test]
    fn extract_all_emits_named_capture_objects() {
        let root = from_sequence("seq", vec![Value::from("a=1 b=2")]);
        let pattern = Regex::new(r"(?P<key>\w+)=(?P<value>\d+)").unwrap();
        let matches = root.extract_all(pattern);
        assert_eq!(
            get(&matches).unwrap(),
            vec![
                serde_json::json!({"key": "a", "value": "1"}),
                serde_json::json!({"key": "b", "value": "2"}),
            ]
        );
    }
}
