//! The codec registry: two process-wide, replaceable mappings from a codec
//! `kind` to a factory producing a codec function, one for `encode` and one
//! for `decode`. Pre-registered kinds: `utf8` (alias `UTF-8`), `json`,
//! `base64`.
//!
//! Ships the three built-in kinds above alongside an extension point for
//! registering more, the same shape as a default-reducers-plus-custom-
//! registration setup.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;

use crate::error::{ReactorError, Result};

/// Construction-time options passed to a codec factory (e.g. a custom
/// delimiter or encoding table). Plain JSON keeps this open-ended without a
/// bespoke options type per codec.
pub type CodecOptions = Value;

/// A single item's codec transform. Stateful codecs (streaming UTF-8
/// decode) close over their own residue buffer.
pub type CodecFn = Box<dyn FnMut(Value) -> Result<Value> + Send>;

/// Builds a [`CodecFn`] from construction-time options.
pub type CodecFactory = Arc<dyn Fn(&CodecOptions) -> Result<CodecFn> + Send + Sync>;

struct Registry {
    encoders: RwLock<HashMap<String, CodecFactory>>,
    decoders: RwLock<HashMap<String, CodecFactory>>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let registry = Registry {
            encoders: RwLock::new(HashMap::new()),
            decoders: RwLock::new(HashMap::new()),
        };
        install_defaults(&registry);
        registry
    })
}

fn install_defaults(registry: &Registry) {
    let mut encoders = registry.encoders.write().unwrap();
    let mut decoders = registry.decoders.write().unwrap();

    for kind in ["utf8", "UTF-8"] {
        encoders.insert(kind.to_string(), Arc::new(|_opts| Ok(encode_utf8())));
        decoders.insert(kind.to_string(), Arc::new(|_opts| Ok(decode_utf8())));
    }
    encoders.insert("json".to_string(), Arc::new(|_opts| Ok(encode_json())));
    decoders.insert("json".to_string(), Arc::new(|_opts| Ok(decode_json())));
    encoders.insert("base64".to_string(), Arc::new(|_opts| Ok(encode_base64())));
    decoders.insert("base64".to_string(), Arc::new(|_opts| Ok(decode_base64())));
}

/// Register (or replace) an encoder factory for `kind`. Installation is not
/// synchronized against concurrent source construction and must happen
/// before any source uses that kind.
pub fn register_encoder(kind: impl Into<String>, factory: CodecFactory) {
    registry().encoders.write().unwrap().insert(kind.into(), factory);
}

/// Register (or replace) a decoder factory for `kind`.
pub fn register_decoder(kind: impl Into<String>, factory: CodecFactory) {
    registry().decoders.write().unwrap().insert(kind.into(), factory);
}

/// Build an encoder for `kind`, or fail with [`ReactorError::UnsupportedCodec`].
pub fn encoder(kind: &str, opts: &CodecOptions) -> Result<CodecFn> {
    let factories = registry().encoders.read().unwrap();
    let factory = factories
        .get(kind)
        .ok_or_else(|| ReactorError::UnsupportedCodec(kind.to_string()))?;
    factory(opts)
}

/// Build a decoder for `kind`, or fail with [`ReactorError::UnsupportedCodec`].
pub fn decoder(kind: &str, opts: &CodecOptions) -> Result<CodecFn> {
    let factories = registry().decoders.read().unwrap();
    let factory = factories
        .get(kind)
        .ok_or_else(|| ReactorError::UnsupportedCodec(kind.to_string()))?;
    factory(opts)
}

fn value_as_bytes(item: &Value) -> Result<Vec<u8>> {
    match item {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| ReactorError::UnsupportedArgument(format!("byte array element out of range: {v}")))
            })
            .collect(),
        other => Err(ReactorError::UnsupportedArgument(format!(
            "codec expected a string or byte-array item, got {other}"
        ))),
    }
}

/// `encode('utf8')` is the identity on this engine's item model: items are
/// already UTF-8 text (`Value::String`), so encoding to bytes is a no-op
/// pass-through. This is what makes `encode('utf8') . decode('utf8')`
/// idempotent.
fn encode_utf8() -> CodecFn {
    Box::new(|item| match item {
        Value::String(_) => Ok(item),
        other => Err(ReactorError::UnsupportedArgument(format!(
            "utf8 encode expected a string item, got {other}"
        ))),
    })
}

/// Stateful: buffers bytes until a full character boundary, emitting the
/// valid prefix and holding the rest as residue.
fn decode_utf8() -> CodecFn {
    let mut residue: Vec<u8> = Vec::new();
    Box::new(move |item| {
        residue.extend_from_slice(&value_as_bytes(&item)?);
        let valid_len = match std::str::from_utf8(&residue) {
            Ok(_) => residue.len(),
            Err(e) => e.valid_up_to(),
        };
        let rest = residue.split_off(valid_len);
        let text = String::from_utf8(std::mem::replace(&mut residue, rest))
            .expect("valid_up_to guarantees a valid UTF-8 boundary");
        Ok(Value::String(text))
    })
}

fn encode_json() -> CodecFn {
    Box::new(|item| {
        serde_json::to_string(&item)
            .map(Value::String)
            .map_err(|e| ReactorError::UnsupportedArgument(e.to_string()))
    })
}

fn decode_json() -> CodecFn {
    Box::new(|item| {
        let text = item
            .as_str()
            .ok_or_else(|| ReactorError::UnsupportedArgument("json decode expected a string item".into()))?;
        serde_json::from_str(text).map_err(|e| ReactorError::UnsupportedArgument(e.to_string()))
    })
}

fn encode_base64() -> CodecFn {
    Box::new(|item| Ok(Value::String(BASE64.encode(value_as_bytes(&item)?))))
}

fn decode_base64() -> CodecFn {
    Box::new(|item| {
        let text = item
            .as_str()
            .ok_or_else(|| ReactorError::UnsupportedArgument("base64 decode expected a string item".into()))?;
        let bytes = BASE64
            .decode(text)
            .map_err(|e| ReactorError::UnsupportedArgument(e.to_string()))?;
        String::from_utf8(bytes)
            .map(Value::String)
            .map_err(|e| ReactorError::UnsupportedArgument(e.to_string()))
    })
}
