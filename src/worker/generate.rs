//! Generation driver: sampler-chain token selection over the maintained
//! window.

use tracing::debug;

use crate::error::Error;
use crate::native::NativeModel;
use crate::sampler::SamplerChain;
use crate::token::Token;

use super::message::{FinishReason, Reply};
use super::state::ContextState;
use super::CancelToken;

/// How a generation loop ended.
pub(crate) enum GenerateEnd {
    Finished(FinishReason),
    Cancelled,
}

/// Checks that run before the streaming handshake, so the caller's await
/// fails directly instead of through a broken stream.
pub(crate) fn validate(state: &ContextState) -> Result<(), Error> {
    if state.needs_ingesting() {
        return Err(Error::StateViolation(
            "context has tokens pending ingest; run ingest before generate".into(),
        ));
    }
    if state.window.ingested() == 0 {
        return Err(Error::StateViolation(
            "context has no ingested tokens to sample from".into(),
        ));
    }
    Ok(())
}

/// Run the generation loop. Sampler scratch is reserved up front and
/// released on every exit path.
pub(crate) fn run(
    state: &mut ContextState,
    model: &NativeModel,
    chain: &mut SamplerChain,
    cancel: &mut CancelToken,
    emit: &mut dyn FnMut(Reply),
) -> Result<GenerateEnd, Error> {
    chain.reserve_scratch(&mut state.native)?;
    let result = drive(state, model, chain, cancel, emit);
    chain.release_scratch(&mut state.native);
    result
}

fn drive(
    state: &mut ContextState,
    model: &NativeModel,
    chain: &mut SamplerChain,
    cancel: &mut CancelToken,
    emit: &mut dyn FnMut(Reply),
) -> Result<GenerateEnd, Error> {
    while state.window.ingested() < state.n_ctx {
        let Some(row) = state.window.last_logits_row() else {
            return Err(Error::StateViolation("logits buffer is empty".into()));
        };
        state.candidates.load(row);

        let next = chain.select(&mut state.native, &mut state.candidates, state.window.tokens())?;

        // The loop's only suspension point.
        if cancel.is_cancelled() {
            debug!(token = next.0, "generation cancelled before emit");
            return Ok(GenerateEnd::Cancelled);
        }

        state.window.push_token(next);
        emit(Reply::Token(Token { id: next, text: model.token_text(next) }));

        if next == state.eos {
            return Ok(GenerateEnd::Finished(FinishReason::Eos));
        }

        let pos = state.window.ingested();
        state.batch.clear();
        state.batch.push(next, pos, true);
        state.native.decode(&state.batch)?;
        state.window.push_logits_row(state.native.logits_row(0, state.n_vocab));
    }
    Ok(GenerateEnd::Finished(FinishReason::ContextFull))
}
