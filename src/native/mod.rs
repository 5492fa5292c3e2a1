//! Safe façade over the bundled inference backend.
//!
//! Thin value-level wrappers: raw calls, status translation into crate
//! errors, RAII ownership of native handles. Every caller lives on the
//! worker thread; nothing here is shared across threads.

mod backend;
mod batch;
mod candidates;
mod context;
mod model;

pub(crate) use backend::Backend;
pub use batch::BatchSlab;
pub use candidates::CandidateBuffer;
pub use context::NativeContext;
pub use model::NativeModel;

/// Sequence id used for every batch and KV-cache operation. The engine pins
/// all work to sequence 1; id 0 is never used.
pub const INFERENCE_SEQ: llama_cpp_sys_2::llama_seq_id = 1;
