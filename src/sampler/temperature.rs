//! Temperature scaling.

use crate::error::Error;
use crate::native::{CandidateBuffer, NativeContext};
use crate::token::TokenId;

use super::Sampler;

/// Divides every logit by the temperature. Values below 1 sharpen the
/// distribution; values above 1 flatten it. Non-positive temperatures are
/// clamped to a tiny epsilon, which degenerates to an arg-max.
pub struct Temperature {
    temperature: f32,
}

impl Temperature {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }

    pub fn apply(&self, candidates: &mut CandidateBuffer) {
        let temperature = if self.temperature <= 0.0 { 1e-7 } else { self.temperature };
        for entry in candidates.entries_mut() {
            entry.logit /= temperature;
        }
        // Division by a positive constant preserves ordering, so the sorted
        // flag stays as it was.
    }
}

impl Sampler for Temperature {
    fn name(&self) -> &str {
        "temperature"
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
    use super::Temperature;
    use crate::native::CandidateBuffer;

    #[test]
    fn halving_temperature_doubles_logits() {
        let mut buf = CandidateBuffer::new(3);
        buf.load(&[1.0, -2.0, 0.5]);
        Temperature::new(0.5).apply(&mut buf);
        let logits: Vec<f32> = buf.entries().iter().map(|c| c.logit).collect();
        assert_eq!(logits, vec![2.0, -4.0, 1.0]);
    }

    #[test]
    fn non_positive_temperature_is_clamped() {
        let mut buf = CandidateBuffer::new(2);
        buf.load(&[1.0, 0.9]);
        Temperature::new(0.0).apply(&mut buf);
        // Sharpened to the point the top logit dominates outright.
        assert!(buf.entries()[0].logit > buf.entries()[1].logit);
        assert!(buf.entries()[0].logit.is_finite());
    }
}
