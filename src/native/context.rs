//! RAII handle over a native inference context.

use std::ptr::NonNull;

use llama_cpp_sys_2 as sys;

use crate::config::ContextParams;
use crate::error::Error;
use crate::token::TokenId;

use super::batch::BatchSlab;
use super::candidates::CandidateBuffer;
use super::model::NativeModel;

/// An inference context bound to one model. Owned exclusively by the
/// worker; freed on drop, before its model.
pub struct NativeContext {
    ptr: NonNull<sys::llama_context>,
}

impl NativeContext {
    pub(crate) fn new(model: &NativeModel, params: &ContextParams) -> Result<Self, Error> {
        let threads = resolve_threads(params.n_threads);
        let mut cp = unsafe { sys::llama_context_default_params() };
        cp.seed = params.seed as _;
        cp.n_ctx = params.n_ctx as _;
        cp.n_batch = params.n_batch as _;
        cp.n_ubatch = params.n_batch as _;
        cp.n_threads = threads as _;
        cp.n_threads_batch = threads as _;
        cp.rope_freq_base = params.rope_freq_base;
        cp.rope_freq_scale = params.rope_freq_scale;
        cp.logits_all = params.logits_all;
        cp.embeddings = params.embedding;

        let ptr = unsafe { sys::llama_new_context_with_model(model.as_ptr(), cp) };
        NonNull::new(ptr).map(|ptr| Self { ptr }).ok_or_else(|| {
            Error::NativeAllocFailure(format!(
                "context with n_ctx={} n_batch={}",
                params.n_ctx, params.n_batch
            ))
        })
    }

    pub(crate) fn decode(&mut self, batch: &BatchSlab) -> Result<(), Error> {
        let status = unsafe { sys::llama_decode(self.ptr.as_ptr(), batch.raw()) };
        if status != 0 {
            return Err(Error::NativeCallFailure { call: "llama_decode", status });
        }
        Ok(())
    }

    /// Logits slab for the last decode: `n_rows` rows of `n_vocab` floats,
    /// row-major, owned by the native context.
    pub(crate) fn logits(&self, n_rows: usize, n_vocab: usize) -> &[f32] {
        unsafe {
            std::slice::from_raw_parts(sys::llama_get_logits(self.ptr.as_ptr()), n_rows * n_vocab)
        }
    }

    /// Logits row for batch position `row` of the last decode.
    pub(crate) fn logits_row(&self, row: i32, n_vocab: usize) -> &[f32] {
        unsafe {
            std::slice::from_raw_parts(sys::llama_get_logits_ith(self.ptr.as_ptr(), row), n_vocab)
        }
    }

    /// Drop KV-cache entries of `seq` for positions `[start, ∞)`.
    pub(crate) fn kv_remove_from(&mut self, seq: sys::llama_seq_id, start: usize) {
        let _ = unsafe {
            sys::llama_kv_cache_seq_rm(self.ptr.as_ptr(), seq, start as sys::llama_pos, -1)
        };
    }

    /// Arg-max over the candidate logits.
    pub fn sample_greedy(&mut self, candidates: &mut CandidateBuffer) -> TokenId {
        let mut array = candidates.as_array();
        let id = unsafe { sys::llama_sample_token_greedy(self.ptr.as_ptr(), &mut array) };
        candidates.sync_from(&array);
        TokenId(id)
    }

    /// Weighted draw over the candidate distribution using the context's
    /// RNG, seeded from its creation params.
    pub fn sample_dist(&mut self, candidates: &mut CandidateBuffer) -> TokenId {
        let mut array = candidates.as_array();
        let id = unsafe { sys::llama_sample_token(self.ptr.as_ptr(), &mut array) };
        candidates.sync_from(&array);
        TokenId(id)
    }
}

impl Drop for NativeContext {
    fn drop(&mut self) {
        unsafe { sys::llama_free(self.ptr.as_ptr()) };
    }
}

fn resolve_threads(requested: u32) -> u32 {
    if requested != 0 {
        return requested;
    }
    // Decoding is memory-bound; logical cores help hide latency, with a cap
    // against diminishing returns on high-core-count machines.
    num_cpus::get().clamp(1, 16) as u32
}
