//! Error types for the kiln runtime.
//!
//! Every failure a control can produce is serialized into the response
//! envelope's error slot; a call never receives both an error and a
//! completion.

use thiserror::Error;

/// Errors surfaced by the worker and the client façade.
#[derive(Debug, Error)]
pub enum Error {
    #[error("model load failed: {0}")]
    NativeLoadFailure(String),

    #[error("context allocation failed: {0}")]
    NativeAllocFailure(String),

    #[error("native call {call} failed with status {status}")]
    NativeCallFailure { call: &'static str, status: i32 },

    #[error("unknown handle: {0}")]
    UnknownHandle(String),

    #[error("model still referenced by {count} live context(s)")]
    HandleStillReferenced { count: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    StateViolation(String),

    #[error("sampler '{terminal}' produced a token but is not last; unused samplers: {}", unused.join(", "))]
    SamplerMisuse {
        terminal: String,
        unused: Vec<String>,
    },

    #[error("unknown native log level {0}")]
    UnknownLogLevel(i32),

    #[error("worker channel closed")]
    ChannelClosed,

    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
}

impl Error {
    /// True for failures of the native library itself, as opposed to
    /// protocol or argument errors.
    pub fn is_native(&self) -> bool {
        matches!(
            self,
            Self::NativeLoadFailure(_)
                | Self::NativeAllocFailure(_)
                | Self::NativeCallFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn sampler_misuse_lists_unused_samplers() {
        let err = Error::SamplerMisuse {
            terminal: "greedy".into(),
            unused: vec!["top_k".into(), "dist".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("greedy"));
        assert!(msg.contains("top_k, dist"));
    }

    #[test]
    fn native_classification() {
        assert!(Error::NativeLoadFailure("x".into()).is_native());
        assert!(Error::NativeCallFailure { call: "llama_decode", status: 1 }.is_native());
        assert!(!Error::UnknownHandle("model 3".into()).is_native());
    }
}
