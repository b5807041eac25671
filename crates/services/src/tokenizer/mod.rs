//! Pluggable token counting
//!
//! Each dialect gets a named tokenizer strategy from configuration so reported
//! usage numbers look plausible for the API being mimicked. All strategies are
//! deterministic: the same text always yields the same count and boundaries.

use crate::common::Dialect;
use config::{DialectsConfig, TokenizerKind};
use std::collections::HashMap;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum TokenizerError {
    #[error("failed to load {kind} encoding: {message}")]
    Load { kind: TokenizerKind, message: String },
}

pub trait Tokenizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn count(&self, text: &str) -> u32;

    /// Byte offsets at which each token ends. The offsets tile `text`
    /// exactly; `None` when the text cannot be split losslessly.
    fn boundaries(&self, text: &str) -> Option<Vec<usize>>;
}

/// End offset of the word unit starting at `start`: any leading whitespace
/// followed by the next run of non-whitespace characters.
pub(crate) fn word_end(text: &str, start: usize) -> usize {
    let rest = &text[start..];
    let mut seen_word = false;
    for (offset, ch) in rest.char_indices() {
        if ch.is_whitespace() {
            if seen_word {
                return start + offset;
            }
        } else {
            seen_word = true;
        }
    }
    text.len()
}

pub(crate) fn word_boundaries(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut cursor = 0;
    while cursor < text.len() {
        cursor = word_end(text, cursor);
        ends.push(cursor);
    }
    ends
}

/// One token per whitespace-separated word
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn name(&self) -> &'static str {
        "whitespace"
    }

    fn count(&self, text: &str) -> u32 {
        text.split_whitespace().count() as u32
    }

    fn boundaries(&self, text: &str) -> Option<Vec<usize>> {
        Some(word_boundaries(text))
    }
}

/// About four characters per token
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproximateTokenizer;

const CHARS_PER_TOKEN: usize = 4;

impl Tokenizer for ApproximateTokenizer {
    fn name(&self) -> &'static str {
        "approximate"
    }

    fn count(&self, text: &str) -> u32 {
        text.chars().count().div_ceil(CHARS_PER_TOKEN) as u32
    }

    fn boundaries(&self, text: &str) -> Option<Vec<usize>> {
        let mut ends: Vec<usize> = text
            .char_indices()
            .skip(CHARS_PER_TOKEN)
            .step_by(CHARS_PER_TOKEN)
            .map(|(offset, _)| offset)
            .collect();
        if !text.is_empty() {
            ends.push(text.len());
        }
        Some(ends)
    }
}

/// OpenAI byte-pair encoding
pub struct BpeTokenizer {
    kind: TokenizerKind,
    bpe: CoreBPE,
}

impl BpeTokenizer {
    pub fn load(kind: TokenizerKind) -> Result<Self, TokenizerError> {
        let bpe = match kind {
            TokenizerKind::Cl100kBase => tiktoken_rs::cl100k_base(),
            TokenizerKind::O200kBase => tiktoken_rs::o200k_base(),
            other => {
                return Err(TokenizerError::Load {
                    kind: other,
                    message: "not a BPE encoding".to_string(),
                })
            }
        }
        .map_err(|e| TokenizerError::Load {
            kind,
            message: e.to_string(),
        })?;
        Ok(Self { kind, bpe })
    }
}

impl Tokenizer for BpeTokenizer {
    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    fn count(&self, text: &str) -> u32 {
        self.bpe.encode_with_special_tokens(text).len() as u32
    }

    fn boundaries(&self, text: &str) -> Option<Vec<usize>> {
        // Tokens that cut through a multi-byte character cannot be decoded on
        // their own; callers fall back to word units in that case.
        let pieces = self.bpe.split_by_token(text, true).ok()?;
        let mut ends = Vec::with_capacity(pieces.len());
        let mut cursor = 0;
        for piece in &pieces {
            if !text[cursor..].starts_with(piece.as_str()) {
                return None;
            }
            cursor += piece.len();
            ends.push(cursor);
        }
        (cursor == text.len()).then_some(ends)
    }
}

fn build(kind: TokenizerKind) -> Result<Arc<dyn Tokenizer>, TokenizerError> {
    Ok(match kind {
        TokenizerKind::Whitespace => Arc::new(WhitespaceTokenizer),
        TokenizerKind::Approximate => Arc::new(ApproximateTokenizer),
        TokenizerKind::Cl100kBase | TokenizerKind::O200kBase => Arc::new(BpeTokenizer::load(kind)?),
    })
}

/// Tokenizer selected for each dialect
#[derive(Clone)]
pub struct TokenizerRegistry {
    openai: Arc<dyn Tokenizer>,
    anthropic: Arc<dyn Tokenizer>,
}

impl TokenizerRegistry {
    /// Build the configured tokenizers. An encoding that fails to load is
    /// replaced by the whitespace tokenizer so the server can still start.
    pub fn from_config(config: &DialectsConfig) -> Self {
        let mut loaded: HashMap<TokenizerKind, Arc<dyn Tokenizer>> = HashMap::new();
        let mut resolve = |dialect: Dialect, kind: TokenizerKind| -> Arc<dyn Tokenizer> {
            if let Some(existing) = loaded.get(&kind) {
                return existing.clone();
            }
            let tokenizer = build(kind).unwrap_or_else(|e| {
                warn!(%dialect, error = %e, "Falling back to whitespace tokenizer");
                Arc::new(WhitespaceTokenizer)
            });
            info!(%dialect, tokenizer = tokenizer.name(), "Tokenizer ready");
            loaded.insert(kind, tokenizer.clone());
            tokenizer
        };

        let openai = resolve(Dialect::OpenAi, config.openai.tokenizer);
        let anthropic = resolve(Dialect::Anthropic, config.anthropic.tokenizer);
        Self { openai, anthropic }
    }

    pub fn new(openai: Arc<dyn Tokenizer>, anthropic: Arc<dyn Tokenizer>) -> Self {
        Self { openai, anthropic }
    }

    /// Whitespace counting for both dialects
    pub fn whitespace() -> Self {
        Self::new(Arc::new(WhitespaceTokenizer), Arc::new(WhitespaceTokenizer))
    }

    pub fn for_dialect(&self, dialect: Dialect) -> &dyn Tokenizer {
        match dialect {
            Dialect::OpenAi => self.openai.as_ref(),
            Dialect::Anthropic => self.anthropic.as_ref(),
        }
    }
}
