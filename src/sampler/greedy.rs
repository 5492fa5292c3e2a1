//! Greedy terminal sampler.

use crate::error::Error;
use crate::native::{CandidateBuffer, NativeContext};
use crate::token::TokenId;

use super::Sampler;

/// Terminal sampler: arg-max over the candidate logits.
pub struct Greedy;

impl Sampler for Greedy {
    fn name(&self) -> &str {
        "greedy"
    }

    fn sample(
        &mut self,
        ctx: &mut NativeContext,
        candidates: &mut CandidateBuffer,
        _tokens: &[TokenId],
    ) -> Result<Option<TokenId>, Error> {
        Ok(Some(ctx.sample_greedy(candidates)))
    }
}
