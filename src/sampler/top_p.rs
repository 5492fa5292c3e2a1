//! Nucleus (top-p) filtering.

use crate::error::Error;
use crate::native::{CandidateBuffer, NativeContext};
use crate::token::TokenId;

use super::Sampler;

/// Keeps the smallest prefix of the sorted distribution whose cumulative
/// probability exceeds `p`. `p >= 1` disables the filter.
pub struct TopP {
    p: f32,
}

impl TopP {
    pub fn new(p: f32) -> Self {
        Self { p }
    }

    pub fn apply(&self, candidates: &mut CandidateBuffer) {
        if self.p >= 1.0 || candidates.is_empty() {
            return;
        }
        candidates.sort_by_logit();
        candidates.softmax();

        let mut cumulative = 0.0f32;
        let mut keep = candidates.len();
        for (index, entry) in candidates.entries().iter().enumerate() {
            cumulative += entry.p;
            if cumulative > self.p {
                keep = index + 1;
                break;
            }
        }
        candidates.truncate(keep);
    }
}

impl Sampler for TopP {
    fn name(&self) -> &str {
        "top_p"
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
    use super::TopP;
    use crate::native::CandidateBuffer;

    #[test]
    fn dominant_candidate_prunes_the_tail() {
        let mut buf = CandidateBuffer::new(4);
        // Softmax of [10, 0, 0, 0] puts essentially all mass on id 0.
        buf.load(&[10.0, 0.0, 0.0, 0.0]);
        TopP::new(0.9).apply(&mut buf);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.entries()[0].id, 0);
    }

    #[test]
    fn uniform_distribution_keeps_most_of_the_mass() {
        let mut buf = CandidateBuffer::new(4);
        buf.load(&[1.0, 1.0, 1.0, 1.0]);
        TopP::new(0.5).apply(&mut buf);
        // Each candidate carries 0.25; the cutoff lands after the third.
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn p_of_one_is_a_noop() {
        let mut buf = CandidateBuffer::new(3);
        buf.load(&[0.3, 0.2, 0.1]);
        TopP::new(1.0).apply(&mut buf);
        assert_eq!(buf.len(), 3);
    }
}
