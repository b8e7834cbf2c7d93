//! `map`, `prefix`/`suffix`, `chomp`, and the codec operators `encode`/
//! `decode`.

use std::sync::Arc;

use serde_json::Value;

use crate::codec::{self, CodecOptions};
use crate::error::{ReactorError, Result};
use super::forward_terminal;
use crate::source::Source;
use crate::value_ext::as_text;

impl Source {
    /// Emit `f(x)` for each upstream item.
    pub fn map<F>(self: &Arc<Self>, mut f: F) -> Arc<Source>
    where
        F: FnMut(&Value) -> Result<Value> + Send + 'static,
    {
        let downstream = self.chained("map");
        let sink = Arc::clone(&downstream);
        self.each_while_source(
            move |item| {
                let mapped = f(item)?;
                sink.emit(mapped)
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
        downstream
    }

    /// Emit `t ++ x` for each upstream item, coercing `x` to text.
    pub fn prefix(self: &Arc<Self>, t: impl Into<String>) -> Arc<Source> {
        let t = t.into();
        self.map(move |item| Ok(Value::String(format!("{t}{}", as_text(item)))))
    }

    /// Emit `x ++ t` for each upstream item, coercing `x` to text.
    pub fn suffix(self: &Arc<Self>, t: impl Into<String>) -> Arc<Source> {
        let t = t.into();
        self.map(move |item| Ok(Value::String(format!("{}{t}", as_text(item)))))
    }

    /// Strip one trailing `delim` (default `"\n"`, captured at operator
    /// creation) from each item's text.
    pub fn chomp(self: &Arc<Self>, delim: Option<&str>) -> Arc<Source> {
        let delim = delim.unwrap_or("\n").to_string();
        self.map(move |item| {
            let text = as_text(item);
            let stripped = text.strip_suffix(delim.as_str()).unwrap_or(&text);
            Ok(Value::String(stripped.to_string()))
        })
    }

    /// Run each item through the registered encoder for `kind`, falling
    /// back to an `encode_<kind>` extension registered on this source if
    /// the process-wide registry has no entry for `kind`.
    pub fn encode(self: &Arc<Self>, kind: &str, opts: &CodecOptions) -> Result<Arc<Source>> {
        let mut codec = match codec::encoder(kind, opts) {
            Ok(codec) => codec,
            Err(ReactorError::UnsupportedCodec(_)) => match self.encode_extension(kind) {
                Some(factory) => factory(opts)?,
                None => return Err(ReactorError::UnsupportedCodec(kind.to_string())),
            },
            Err(e) => return Err(e),
        };
        let downstream = self.chained(format!("encode({kind})"));
        let sink = Arc::clone(&downstream);
        self.each_while_source(
            move |item| {
                let encoded = codec(item.clone())?;
                sink.emit(encoded)
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
        Ok(downstream)
    }

    /// Run each item through the registered decoder for `kind`, falling
    /// back to a `decode_<kind>` extension registered on this source if the
    /// process-wide registry has no entry for `kind`.
    /// Stateful decoders (streaming UTF-8) keep their residue inside the
    /// codec closure across calls.
    pub fn decode(self: &Arc<Self>, kind: &str, opts: &CodecOptions) -> Result<Arc<Source>> {
        let mut codec = match codec::decoder(kind, opts) {
            Ok(codec) => codec,
            Err(ReactorError::UnsupportedCodec(_)) => match self.decode_extension(kind) {
                Some(factory) => factory(opts)?,
                None => return Err(ReactorError::UnsupportedCodec(kind.to_string())),
            },
            Err(e) => return Err(e),
        };
        let downstream = self.chained(format!("decode({kind})"));
        let sink = Arc::clone(&downstream);
        self.each_while_source(
            move |item| {
                let decoded = codec(item.clone())?;
                sink.emit(decoded)
            },
            &downstream,
        );
        forward_terminal(self, &downstream);
        Ok(downstream)
    }
}
