//! Reusable decode batch slab.

use llama_cpp_sys_2 as sys;

use crate::token::TokenId;

use super::INFERENCE_SEQ;

/// Fixed-capacity staging area for one decode call: parallel token,
/// position, sequence-membership, and logits-flag arrays. Allocated once
/// per context and reused across decode calls.
pub struct BatchSlab {
    raw: sys::llama_batch,
    capacity: usize,
}

impl BatchSlab {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "batch capacity must be nonzero");
        let raw = unsafe { sys::llama_batch_init(capacity as i32, 0, 1) };
        Self { raw, capacity }
    }

    /// Reset to empty. The underlying arrays are reused.
    pub fn clear(&mut self) {
        self.raw.n_tokens = 0;
    }

    pub fn len(&self) -> usize {
        self.raw.n_tokens.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append one token at an absolute sequence position.
    pub fn push(&mut self, token: TokenId, pos: usize, want_logits: bool) {
        let index = self.len();
        assert!(
            index < self.capacity,
            "batch slab overflow: {index} >= {}",
            self.capacity
        );
        unsafe {
            *self.raw.token.add(index) = token.0;
            *self.raw.pos.add(index) = pos as sys::llama_pos;
            *self.raw.n_seq_id.add(index) = 1;
            *(*self.raw.seq_id.add(index)) = INFERENCE_SEQ;
            *self.raw.logits.add(index) = i8::from(want_logits);
        }
        self.raw.n_tokens += 1;
    }

    pub(crate) fn raw(&self) -> sys::llama_batch {
        self.raw
    }
}

impl Drop for BatchSlab {
    fn drop(&mut self) {
        unsafe { sys::llama_batch_free(self.raw) };
    }
}
