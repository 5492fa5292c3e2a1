//! Control and response messages exchanged with the worker.
//!
//! Every control carries a caller-minted nonzero `u32` request id; every
//! response envelope echoes it. Id 0 is reserved for the worker's initial
//! readiness envelope.

use std::path::PathBuf;

use tokio::sync::oneshot;

use crate::config::{ContextParams, ModelParams};
use crate::error::Error;
use crate::sampler::SamplerChain;
use crate::token::Token;

/// Correlation id for one control/response exchange.
pub type RequestId = u32;

/// Reserved id of the worker's readiness envelope.
pub(crate) const HANDSHAKE_ID: RequestId = 0;

/// Opaque reference to loaded model weights, issued by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(u32);

impl ModelHandle {
    /// Rebuild a handle from its raw id, e.g. after persisting it.
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

/// Opaque reference to an inference context, issued by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(u32);

impl ContextHandle {
    pub fn from_raw(id: u32) -> Self {
        Self(id)
    }

    pub fn id(self) -> u32 {
        self.0
    }
}

/// Result of a tokenize call: the appended tokens and the index they were
/// appended at.
#[derive(Debug, Clone)]
pub struct Tokenized {
    pub tokens: Vec<Token>,
    pub start: usize,
}

/// Why a generation loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model emitted its end-of-sequence token.
    Eos,
    /// The token window reached the context size.
    ContextFull,
}

/// Completion state of a cancellable call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
}

/// Inbound control messages.
pub(crate) enum Control {
    Exit { id: RequestId },
    LoadModel { id: RequestId, path: PathBuf, params: ModelParams },
    FreeModel { id: RequestId, model: ModelHandle },
    NewContext { id: RequestId, model: ModelHandle, params: ContextParams },
    FreeContext { id: RequestId, context: ContextHandle },
    Tokenize { id: RequestId, context: ContextHandle, text: String },
    Edit { id: RequestId, context: ContextHandle, new_len: Option<usize> },
    Ingest { id: RequestId, context: ContextHandle },
    Generate { id: RequestId, context: ContextHandle, chain: SamplerChain },
}

impl Control {
    pub fn id(&self) -> RequestId {
        match self {
            Self::Exit { id }
            | Self::LoadModel { id, .. }
            | Self::FreeModel { id, .. }
            | Self::NewContext { id, .. }
            | Self::FreeContext { id, .. }
            | Self::Tokenize { id, .. }
            | Self::Edit { id, .. }
            | Self::Ingest { id, .. }
            | Self::Generate { id, .. } => *id,
        }
    }
}

/// Outbound reply payloads.
#[derive(Debug)]
pub(crate) enum Reply {
    Ready,
    ExitDone,
    LoadProgress(f32),
    ModelLoaded(ModelHandle),
    ModelFreed,
    ContextCreated(ContextHandle),
    ContextFreed,
    Tokenized(Tokenized),
    Edited,
    /// First reply of a streaming call; carries the cancel port.
    Handshake(oneshot::Sender<()>),
    IngestDone,
    Token(Token),
    GenerateDone(FinishReason),
    /// Synthesized by the client façade when the caller cancels. The worker
    /// never sends this: after observing a cancel it goes silent.
    Cancelled,
}

/// Response envelope: the echoed request id plus payload or error.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub id: RequestId,
    pub body: Result<Reply, Error>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controls_echo_their_id() {
        let control = Control::Edit {
            id: 7,
            context: ContextHandle::from_raw(1),
            new_len: None,
        };
        assert_eq!(control.id(), 7);
        assert_eq!(Control::Exit { id: 42 }.id(), 42);
    }
}
