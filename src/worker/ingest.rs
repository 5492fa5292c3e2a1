//! Prefill driver: advances the logits buffer to cover the token buffer.

use crate::error::Error;

use super::message::Outcome;
use super::state::ContextState;
use super::CancelToken;

/// Decode un-ingested tokens in batches of up to the context's batch width,
/// snapshotting the produced logits rows. Positions are absolute within the
/// sequence. Cancellation is observed once per iteration, before the decode
/// call; a decode failure leaves tokens and logits desynchronized for the
/// caller to recover via edit.
pub(crate) fn run(state: &mut ContextState, cancel: &mut CancelToken) -> Result<Outcome, Error> {
    while state.window.needs_ingesting() {
        let start = state.window.ingested();
        let fill = (state.window.len() - start).min(state.n_batch);

        state.batch.clear();
        for offset in 0..fill {
            let pos = start + offset;
            state.batch.push(state.window.tokens()[pos], pos, true);
        }

        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        state.native.decode(&state.batch)?;

        let rows = state.native.logits(fill, state.n_vocab);
        for row in rows.chunks_exact(state.n_vocab) {
            state.window.push_logits_row(row);
        }
    }
    Ok(Outcome::Completed)
}
