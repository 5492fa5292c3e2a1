//! Token value types.

use std::fmt;

/// Vocabulary entry id. A newtype over the backend's `i32` keeps token ids
/// from mixing with unrelated integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub i32);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A token id together with its decoded text rendering.
///
/// The text comes from the vocabulary lookup with the backend's leading
/// space glyph (U+2581) rewritten to an ASCII space.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub id: TokenId,
    pub text: String,
}
