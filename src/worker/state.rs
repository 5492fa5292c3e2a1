//! Per-model and per-context worker state.

use crate::config::ContextParams;
use crate::error::Error;
use crate::native::{BatchSlab, CandidateBuffer, NativeContext, NativeModel, INFERENCE_SEQ};
use crate::token::{Token, TokenId};

use super::message::Tokenized;

/// Loaded model weights plus whatever bookkeeping rides along.
pub(crate) struct ModelState {
    pub native: NativeModel,
}

/// Pure token/logits bookkeeping for one context. Upholds
/// `logits.len() <= tokens.len()` and knows nothing about the backend,
/// which keeps the invariants testable on their own.
#[derive(Default)]
pub(crate) struct TokenWindow {
    tokens: Vec<TokenId>,
    logits: Vec<Box<[f32]>>,
}

impl TokenWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of tokens reflected in the logits buffer (and the KV cache).
    pub fn ingested(&self) -> usize {
        self.logits.len()
    }

    pub fn needs_ingesting(&self) -> bool {
        self.logits.len() < self.tokens.len()
    }

    pub fn tokens(&self) -> &[TokenId] {
        &self.tokens
    }

    pub fn push_token(&mut self, id: TokenId) {
        self.tokens.push(id);
    }

    pub fn extend_tokens(&mut self, ids: &[TokenId]) {
        self.tokens.extend_from_slice(ids);
    }

    pub fn push_logits_row(&mut self, row: &[f32]) {
        debug_assert!(self.logits.len() < self.tokens.len());
        self.logits.push(row.into());
    }

    /// Logits of the most recently ingested token.
    pub fn last_logits_row(&self) -> Option<&[f32]> {
        self.logits.last().map(|row| &**row)
    }

    /// Truncate to `new_len` tokens. Returns whether ingested rows were
    /// dropped, in which case the caller must prune the native KV cache.
    /// Growing the buffer is rejected; tokens cannot be fabricated.
    pub fn truncate(&mut self, new_len: usize) -> Result<bool, Error> {
        if new_len > self.tokens.len() {
            return Err(Error::InvalidArgument(format!(
                "cannot extend token buffer to {new_len} (current length {})",
                self.tokens.len()
            )));
        }
        self.tokens.truncate(new_len);
        let pruned = self.logits.len() > new_len;
        if pruned {
            self.logits.truncate(new_len);
        }
        Ok(pruned)
    }
}

/// Everything the worker keeps per context: the native handle, the token
/// window, and the reusable batch and candidate slabs.
pub(crate) struct ContextState {
    pub native: NativeContext,
    pub window: TokenWindow,
    pub batch: BatchSlab,
    pub candidates: CandidateBuffer,
    pub n_ctx: usize,
    pub n_batch: usize,
    pub n_vocab: usize,
    pub eos: TokenId,
}

impl ContextState {
    pub fn create(model: &NativeModel, params: &ContextParams) -> Result<Self, Error> {
        params.validate()?;
        let native = NativeContext::new(model, params)?;
        let n_vocab = model.n_vocab();
        Ok(Self {
            native,
            window: TokenWindow::new(),
            batch: BatchSlab::new(params.n_batch as usize),
            candidates: CandidateBuffer::new(n_vocab),
            n_ctx: params.n_ctx as usize,
            n_batch: params.n_batch as usize,
            n_vocab,
            eos: model.token_eos(),
        })
    }

    /// Append tokens produced from `text`. The first tokenize of a fresh
    /// context asks the library to prepend the BOS marker; later calls do
    /// not re-prepend it.
    pub fn tokenize_append(&mut self, model: &NativeModel, text: &str) -> Result<Tokenized, Error> {
        let add_bos = self.window.is_empty();
        let ids = model.tokenize(text, add_bos)?;
        if self.window.len() + ids.len() > self.n_ctx {
            return Err(Error::InvalidArgument(format!(
                "tokenized text ({} tokens) does not fit the context window ({} of {} in use)",
                ids.len(),
                self.window.len(),
                self.n_ctx
            )));
        }
        let start = self.window.len();
        self.window.extend_tokens(&ids);
        let tokens = ids
            .into_iter()
            .map(|id| Token { id, text: model.token_text(id) })
            .collect();
        Ok(Tokenized { tokens, start })
    }

    /// Truncate the window to `new_len` tokens. `None` and the current
    /// length are no-ops; when ingested positions are dropped the KV cache
    /// is pruned for `[new_len, ∞)` on the inference sequence.
    pub fn edit(&mut self, new_len: Option<usize>) -> Result<(), Error> {
        let Some(new_len) = new_len else { return Ok(()) };
        if new_len == self.window.len() {
            return Ok(());
        }
        if self.window.truncate(new_len)? {
            self.native.kv_remove_from(INFERENCE_SEQ, new_len);
        }
        Ok(())
    }

    pub fn needs_ingesting(&self) -> bool {
        self.window.needs_ingesting()
    }
}

#[cfg(test)]
mod tests {
    use super::TokenWindow;
    use crate::error::Error;
    use crate::token::TokenId;

    fn window(tokens: usize, ingested: usize) -> TokenWindow {
        assert!(ingested <= tokens);
        let mut w = TokenWindow::new();
        for i in 0..tokens {
            w.push_token(TokenId(i as i32));
        }
        for i in 0..ingested {
            w.push_logits_row(&[i as f32, 0.0]);
        }
        w
    }

    #[test]
    fn fresh_window_is_consistent() {
        let w = TokenWindow::new();
        assert_eq!(w.len(), 0);
        assert_eq!(w.ingested(), 0);
        assert!(!w.needs_ingesting());
        assert!(w.last_logits_row().is_none());
    }

    #[test]
    fn pending_tokens_need_ingest() {
        let w = window(5, 3);
        assert!(w.needs_ingesting());
        assert_eq!(w.ingested(), 3);
        assert_eq!(w.last_logits_row().unwrap()[0], 2.0);
    }

    #[test]
    fn truncate_drops_tokens_and_logits() {
        let mut w = window(10, 10);
        let pruned = w.truncate(4).unwrap();
        assert!(pruned);
        assert_eq!(w.len(), 4);
        assert_eq!(w.ingested(), 4);
    }

    #[test]
    fn truncate_above_ingested_keeps_logits() {
        let mut w = window(10, 3);
        let pruned = w.truncate(5).unwrap();
        assert!(!pruned);
        assert_eq!(w.len(), 5);
        assert_eq!(w.ingested(), 3);
    }

    #[test]
    fn truncate_is_idempotent() {
        let mut w = window(10, 10);
        w.truncate(6).unwrap();
        let pruned_again = w.truncate(6).unwrap();
        assert!(!pruned_again);
        assert_eq!(w.len(), 6);
        assert_eq!(w.ingested(), 6);
    }

    #[test]
    fn truncate_cannot_grow() {
        let mut w = window(3, 3);
        assert!(matches!(w.truncate(4), Err(Error::InvalidArgument(_))));
        // State is untouched by the rejected call.
        assert_eq!(w.len(), 3);
        assert_eq!(w.ingested(), 3);
    }
}
