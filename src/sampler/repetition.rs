//! Repetition penalty.

use std::collections::HashSet;

use crate::error::Error;
use crate::native::{CandidateBuffer, NativeContext};
use crate::token::TokenId;

use super::Sampler;

/// Penalizes candidates whose ids appear in the tail of the context token
/// buffer: positive logits are divided by the penalty, negative ones
/// multiplied. A penalty of 1 disables it.
pub struct RepetitionPenalty {
    penalty: f32,
    last_n: usize,
}

impl RepetitionPenalty {
    pub fn new(penalty: f32, last_n: usize) -> Self {
        Self { penalty, last_n }
    }

    pub fn apply(&self, candidates: &mut CandidateBuffer, tokens: &[TokenId]) {
        if self.penalty <= 1.0 || self.last_n == 0 || tokens.is_empty() {
            return;
        }
        let start = tokens.len().saturating_sub(self.last_n);
        let recent: HashSet<i32> = tokens[start..].iter().map(|t| t.0).collect();
        for entry in candidates.entries_mut() {
            if recent.contains(&entry.id) {
                if entry.logit > 0.0 {
                    entry.logit /= self.penalty;
                } else {
                    entry.logit *= self.penalty;
                }
            }
        }
        candidates.set_sorted(false);
    }
}

impl Sampler for RepetitionPenalty {
    fn name(&self) -> &str {
        "repetition_penalty"
    }

    fn sample(
        &mut self,
        _ctx: &mut NativeContext,
        candidates: &mut CandidateBuffer,
        tokens: &[TokenId],
    ) -> Result<Option<TokenId>, Error> {
        self.apply(candidates, tokens);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::RepetitionPenalty;
    use crate::native::CandidateBuffer;
    use crate::token::TokenId;

    #[test]
    fn recent_tokens_are_penalized() {
        let mut buf = CandidateBuffer::new(3);
        buf.load(&[2.0, -2.0, 2.0]);
        let tokens = [TokenId(0), TokenId(1)];
        RepetitionPenalty::new(2.0, 64).apply(&mut buf, &tokens);
        assert_eq!(buf.entries()[0].logit, 1.0);
        assert_eq!(buf.entries()[1].logit, -4.0);
        assert_eq!(buf.entries()[2].logit, 2.0);
    }

    #[test]
    fn only_the_window_tail_counts() {
        let mut buf = CandidateBuffer::new(2);
        buf.load(&[4.0, 4.0]);
        // Token 0 is outside the 1-token lookback; token 1 is inside.
        let tokens = [TokenId(0), TokenId(1)];
        RepetitionPenalty::new(2.0, 1).apply(&mut buf, &tokens);
        assert_eq!(buf.entries()[0].logit, 4.0);
        assert_eq!(buf.entries()[1].logit, 2.0);
    }

    #[test]
    fn unity_penalty_is_a_noop() {
        let mut buf = CandidateBuffer::new(2);
        buf.load(&[4.0, 4.0]);
        RepetitionPenalty::new(1.0, 64).apply(&mut buf, &[TokenId(0)]);
        assert_eq!(buf.entries()[0].logit, 4.0);
    }
}
