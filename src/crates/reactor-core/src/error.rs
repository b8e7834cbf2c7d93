//! Error types for the source-chain engine.
//!
//! All errors that can terminate a [`crate::source::Source`] or reject an
//! operator/factory call at construction time flow through [`ReactorError`].
//! It uses `thiserror` for the `Error` trait impl, the same as the rest of
//! this crate's error handling.

use serde_json::Value;
use thiserror::Error;

/// Convenience result type using [`ReactorError`].
pub type Result<T> = std::result::Result<T, ReactorError>;

/// Errors produced by the engine.
///
/// Every variant corresponds to one of the error kinds in the error-handling
/// design: a callback exception, a post-terminal emission, an unsupported
/// input/codec/argument at construction time, an unimplemented operator, or
/// an upstream failure passed through unchanged.
#[derive(Error, Debug, Clone)]
pub enum ReactorError {
    /// An item-callback raised while handling an emission.
    ///
    /// Carries the raised payload and a tag identifying the callback site,
    /// tagged with "exception in on_item callback".
    #[error("exception in on_item callback ({site}): {error}")]
    Callback {
        /// Identifies which callback/operator raised.
        site: String,
        /// The raised payload.
        error: Value,
    },

    /// `emit` was called on a source whose completion is already ready.
    #[error("already completed")]
    AlreadyCompleted,

    /// `from(...)` was given an input shape with no matching factory.
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    /// `encode`/`decode` was given a codec kind with no registered factory.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// An operator received a construction-time argument it can't honor.
    #[error("unsupported operator argument: {0}")]
    UnsupportedArgument(String),

    /// The named operator is not implemented by this port.
    ///
    /// Reserved for `debounce`/`interval`, deferred to a timing-capable
    /// extension and raised as an error rather than silently accepted and
    /// ignored.
    #[error("operator not implemented: {0}")]
    Unimplemented(&'static str),

    /// An upstream source failed; this is the payload forwarded downstream
    /// verbatim by operators that adopt upstream's terminal state.
    #[error("upstream failed: {error}")]
    Upstream {
        /// The upstream's original failure payload.
        error: Value,
        /// Metadata tags accumulated as the failure propagated.
        tags: Vec<String>,
    },
}

impl ReactorError {
    /// Build a [`ReactorError::Callback`] tagged with the given call site.
    pub fn callback(site: impl Into<String>, error: Value) -> Self {
        ReactorError::Callback {
            site: site.into(),
            error,
        }
    }

    /// The error value this failure ultimately carries, suitable for storing
    /// in a [`crate::completion::Failure`].
    pub fn into_value(self) -> Value {
        match self {
            ReactorError::Callback { error, .. } => error,
            ReactorError::Upstream { error, .. } => error,
            other => Value::String(other.to_string()),
        }
    }

    /// Tags to attach to a [`crate::completion::Failure`] built from this error.
    pub fn tags(&self) -> Vec<String> {
        match self {
            ReactorError::Callback { site, .. } => {
                vec!["exception in on_item callback".to_string(), site.clone()]
            }
            ReactorError::Upstream { tags, .. } => tags.clone(),
            ReactorError::AlreadyCompleted => vec!["already completed".to_string()],
            _ => Vec::new(),
        }
    }
}
