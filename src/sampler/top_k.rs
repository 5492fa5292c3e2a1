//! Top-K filtering.

use crate::error::Error;
use crate::native::{CandidateBuffer, NativeContext};
use crate::token::TokenId;

use super::Sampler;

/// Keeps only the `k` highest-logit candidates. `k == 0` disables the
/// filter.
pub struct TopK {
    k: usize,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    pub fn apply(&self, candidates: &mut CandidateBuffer) {
        if self.k == 0 || self.k >= candidates.len() {
            return;
        }
        candidates.sort_by_logit();
        candidates.truncate(self.k);
    }
}

impl Sampler for TopK {
    fn name(&self) -> &str {
        "top_k"
    }

    fn sample(
        &mut self,
        _ctx: &mut NativeContext,
        candidates: &mut CandidateBuffer,
        _tokens: &[TokenId],
    ) -> Result<Option<TokenId>, Error> {
        self.apply(candidates);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::TopK;
    use crate::native::CandidateBuffer;

    #[test]
    fn keeps_highest_logits() {
        let mut buf = CandidateBuffer::new(4);
        buf.load(&[0.1, 0.9, 0.5, 0.7]);
        TopK::new(2).apply(&mut buf);
        let ids: Vec<i32> = buf.entries().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(buf.is_sorted());
    }

    #[test]
    fn zero_k_is_a_noop() {
        let mut buf = CandidateBuffer::new(3);
        buf.load(&[0.1, 0.9, 0.5]);
        TopK::new(0).apply(&mut buf);
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_sorted());
    }
}
