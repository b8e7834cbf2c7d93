//! # reactor-core - a reactive source-chain engine
//!
//! Push-based event streams ("sources") composed by chaining: every
//! operator takes an upstream [`Source`] and returns a new downstream
//! `Source` that observes the upstream and emits derived values. Each
//! source emits a sequence of items and eventually terminates exactly once,
//! in one of three ways — done, failed, or cancelled.
//!
//! ## Core concepts
//!
//! ### 1. Completion handle
//!
//! [`Completion`] is a single-assignment, observable terminal state: pending
//! until `done`/`fail`/`cancel` transitions it, after which every registered
//! observer fires exactly once, in registration order. It is the
//! rendezvous point the whole engine builds on — the chain graph uses it to
//! propagate termination, aggregation operators time their emission off it,
//! and the blocking bridge (`get`) suspends on it.
//!
//! ### 2. Source and the chaining graph
//!
//! [`Source`] is a push endpoint: item-callbacks, a `Completion`, a weak
//! parent link, and a strong, owned list of children. Parents own children
//! strongly so a chain's lifetime is anchored at the root for as long as any
//! operator wants it; children observe parents only through the weak
//! back-reference, avoiding a reference cycle.
//!
//! ### 3. Operators
//!
//! Every operator in [`mod@ops`] is an `impl Source` method: `map`,
//! `filter`, the codec operators `encode`/`decode`, text operators
//! (`split`, `by_line`, `chunksize`, `extract_all`, `chomp`, `prefix`,
//! `suffix`), `with_index`, `distinct`/`distinct_until_changed`,
//! `skip`/`skip_last`/`take`, the sort family, `flat_map`, the aggregation
//! terminators (`count`, `sum`, `mean`, `min`, `max`, `statistics`, `some`,
//! `every`, `as_list`/`as_arrayref`/`as_string`), and the combining
//! operators (`merge`, `combine_latest`, `with_latest_from`, `apply`,
//! `each_as_source`, `switch_str`, `ordered_futures`, `catch`).
//!
//! ### 4. Factories and the blocking bridge
//!
//! [`factory`] builds root sources from an in-memory sequence, a
//! byte-oriented reader, or an existing `Completion`. [`bridge::get`] is the
//! engine's only suspension point: it blocks the calling thread until a
//! chain completes, driving the root's deferred action if one is pending.
//!
//! ## Quick start
//!
//! ```
//! use reactor_core::factory::from_sequence;
//! use serde_json::Value;
//!
//! let root = from_sequence("numbers", vec![Value::from(1), Value::from(2), Value::from(3)]);
//! let doubled = root.map(|v| Ok(Value::from(v.as_i64().unwrap() * 2)));
//! let items = reactor_core::bridge::get(&doubled).unwrap();
//! assert_eq!(items, vec![Value::from(2), Value::from(4), Value::from(6)]);
//! ```

pub mod bridge;
pub mod codec;
pub mod completion;
pub mod error;
pub mod factory;
mod ops;
pub mod source;
mod value_ext;

pub use codec::{register_decoder, register_encoder, CodecFactory, CodecFn, CodecOptions};
pub use completion::{Completion, Failure, Ready};
pub use error::{ReactorError, Result};
pub use factory::{
    empty, from, from_completion, from_reader, from_sequence, never, throw, ByteReader, FromInput,
};
pub use ops::{Combine, FilterSpec, FlatMapped, Resolved, SortKey};
pub use source::{ItemCallback, OnGet, Source};
