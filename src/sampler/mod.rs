//! Sampler chain: ordered, composable transformations over a candidate
//! distribution, ending in a token-producing terminal.
//!
//! Non-terminal samplers mutate the candidate buffer and return `None`;
//! a terminal returns the chosen token, after which nothing may follow.
//! A chain that never produces a token falls back to a draw from the
//! current distribution.

mod dist;
mod greedy;
mod repetition;
mod temperature;
mod top_k;
mod top_p;

pub use dist::Dist;
pub use greedy::Greedy;
pub use repetition::RepetitionPenalty;
pub use temperature::Temperature;
pub use top_k::TopK;
pub use top_p::TopP;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::native::{CandidateBuffer, NativeContext};
use crate::token::TokenId;

/// One step of a sampling chain.
pub trait Sampler: Send {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Transform `candidates` and return `None`, or select the next token.
    /// `tokens` is the context's current token buffer, oldest first.
    fn sample(
        &mut self,
        ctx: &mut NativeContext,
        candidates: &mut CandidateBuffer,
        tokens: &[TokenId],
    ) -> Result<Option<TokenId>, Error>;

    /// Reserve native scratch memory before a generation loop.
    fn reserve_scratch(&mut self, _ctx: &mut NativeContext) -> Result<(), Error> {
        Ok(())
    }

    /// Release scratch after the loop. Invoked on every exit path.
    fn release_scratch(&mut self, _ctx: &mut NativeContext) {}
}

/// Knobs for [`SamplerChain::standard`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_k: usize,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_k: 40,
            top_p: 0.95,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
        }
    }
}

/// Ordered list of samplers supplied per generate call.
pub struct SamplerChain {
    samplers: Vec<Box<dyn Sampler>>,
}

impl SamplerChain {
    pub fn new() -> Self {
        Self { samplers: Vec::new() }
    }

    /// Conventional chain: repetition penalty, top-k, top-p, then either a
    /// greedy pick (zero temperature) or a tempered seeded draw.
    pub fn standard(options: &SamplingOptions) -> Self {
        let mut chain = Self::new();
        if options.repeat_penalty > 1.0 {
            chain.push(RepetitionPenalty::new(options.repeat_penalty, options.repeat_last_n));
        }
        if options.top_k > 0 {
            chain.push(TopK::new(options.top_k));
        }
        chain.push(TopP::new(options.top_p));
        if options.temperature <= 0.0 {
            chain.with(Greedy)
        } else {
            chain.push(Temperature::new(options.temperature));
            chain.with(Dist)
        }
    }

    /// Append a sampler, builder-style.
    pub fn with(mut self, sampler: impl Sampler + 'static) -> Self {
        self.push(sampler);
        self
    }

    pub fn push(&mut self, sampler: impl Sampler + 'static) {
        self.samplers.push(Box::new(sampler));
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub(crate) fn reserve_scratch(&mut self, ctx: &mut NativeContext) -> Result<(), Error> {
        for index in 0..self.samplers.len() {
            if let Err(err) = self.samplers[index].reserve_scratch(ctx) {
                for sampler in &mut self.samplers[..index] {
                    sampler.release_scratch(ctx);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub(crate) fn release_scratch(&mut self, ctx: &mut NativeContext) {
        for sampler in &mut self.samplers {
            sampler.release_scratch(ctx);
        }
    }

    /// Run the chain strictly in order. A token from any sampler but the
    /// last is a misuse error naming the unused tail; a chain with no
    /// terminal falls back to a draw from the current distribution.
    pub(crate) fn select(
        &mut self,
        ctx: &mut NativeContext,
        candidates: &mut CandidateBuffer,
        tokens: &[TokenId],
    ) -> Result<TokenId, Error> {
        let count = self.samplers.len();
        for index in 0..count {
            let Some(token) = self.samplers[index].sample(ctx, candidates, tokens)? else {
                continue;
            };
            if index + 1 != count {
                return Err(Error::SamplerMisuse {
                    terminal: self.samplers[index].name().to_string(),
                    unused: self.samplers[index + 1..]
                        .iter()
                        .map(|s| s.name().to_string())
                        .collect(),
                });
            }
            return Ok(token);
        }
        Ok(ctx.sample_dist(candidates))
    }
}

impl Default for SamplerChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_chain_shape() {
        let chain = SamplerChain::standard(&SamplingOptions::default());
        // penalty, top-k, top-p, temperature, dist
        assert_eq!(chain.len(), 5);

        let greedy = SamplerChain::standard(&SamplingOptions {
            temperature: 0.0,
            repeat_penalty: 1.0,
            top_k: 0,
            ..Default::default()
        });
        // top-p, greedy
        assert_eq!(greedy.len(), 2);
    }
}
