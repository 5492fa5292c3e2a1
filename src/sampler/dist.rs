//! Probabilistic terminal sampler.

use crate::error::Error;
use crate::native::{CandidateBuffer, NativeContext};
use crate::token::TokenId;

use super::Sampler;

/// Terminal sampler: weighted random draw over the candidate distribution,
/// using the context's RNG (seeded from its creation params).
pub struct Dist;

impl Sampler for Dist {
    fn name(&self) -> &str {
        "dist"
    }

    fn sample(
        &mut self,
        ctx: &mut NativeContext,
        candidates: &mut CandidateBuffer,
        _tokens: &[TokenId],
    ) -> Result<Option<TokenId>, Error> {
        Ok(Some(ctx.sample_dist(candidates)))
    }
}
