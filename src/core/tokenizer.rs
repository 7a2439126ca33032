//! Token counting
//!
//! Counting goes through a prioritized chain of providers. The first provider
//! that succeeds wins; whitespace word counting is the floor and never fails.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use thiserror::Error;
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

/// Errors raised by individual token counters
#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("failed to load {encoding} encoding: {reason}")]
    Load {
        encoding: &'static str,
        reason: String,
    },

    #[error("unknown tokenizer provider: {0}")]
    UnknownProvider(String),
}

/// A single way of counting tokens.
pub trait TokenCounter: Send + Sync {
    /// Provider name as used in configuration
    fn name(&self) -> &str;

    /// Count tokens, or report why this provider can't.
    fn try_count(&self, text: &str) -> Result<usize, TokenizerError>;
}

/// BPE encodings bundled with tiktoken-rs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpeEncoding {
    Cl100k,
    O200k,
}

impl BpeEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            BpeEncoding::Cl100k => "cl100k_base",
            BpeEncoding::O200k => "o200k_base",
        }
    }

    fn load(&self) -> Result<CoreBPE, String> {
        let loaded = match self {
            BpeEncoding::Cl100k => tiktoken_rs::cl100k_base(),
            BpeEncoding::O200k => tiktoken_rs::o200k_base(),
        };
        loaded.map_err(|e| e.to_string())
    }
}

/// tiktoken-backed counter. The encoding is loaded on first use.
pub struct BpeCounter {
    encoding: BpeEncoding,
    bpe: OnceCell<Result<CoreBPE, String>>,
}

impl BpeCounter {
    pub fn new(encoding: BpeEncoding) -> Self {
        Self {
            encoding,
            bpe: OnceCell::new(),
        }
    }
}

impl TokenCounter for BpeCounter {
    fn name(&self) -> &str {
        self.encoding.name()
    }

    fn try_count(&self, text: &str) -> Result<usize, TokenizerError> {
        let loaded = self.bpe.get_or_init(|| {
            let result = self.encoding.load();
            if let Err(reason) = &result {
                warn!("{} unavailable, later providers will be used: {}", self.encoding.name(), reason);
            }
            result
        });

        match loaded {
            // Special-token markup in user text is counted as plain text
            Ok(bpe) => Ok(bpe.encode_ordinary(text).len()),
            Err(reason) => Err(TokenizerError::Load {
                encoding: self.encoding.name(),
                reason: reason.clone(),
            }),
        }
    }
}

/// Whitespace-delimited word count
#[derive(Debug, Default, Clone, Copy)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn name(&self) -> &str {
        "words"
    }

    fn try_count(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(word_count(text))
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Prioritized list of token counters
#[derive(Clone)]
pub struct TokenizerChain {
    providers: Vec<Arc<dyn TokenCounter>>,
}

impl TokenizerChain {
    pub fn new(providers: Vec<Arc<dyn TokenCounter>>) -> Self {
        Self { providers }
    }

    /// Build a chain from provider names (`cl100k_base`, `o200k_base`, `words`).
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, TokenizerError> {
        let mut providers: Vec<Arc<dyn TokenCounter>> = Vec::with_capacity(names.len());
        for name in names {
            let provider: Arc<dyn TokenCounter> = match name.as_ref().to_lowercase().as_str() {
                "cl100k_base" | "cl100k" => Arc::new(BpeCounter::new(BpeEncoding::Cl100k)),
                "o200k_base" | "o200k" => Arc::new(BpeCounter::new(BpeEncoding::O200k)),
                "words" | "whitespace" => Arc::new(WordCounter),
                other => return Err(TokenizerError::UnknownProvider(other.to_string())),
            };
            providers.push(provider);
        }
        Ok(Self::new(providers))
    }

    /// Chain that only counts words. Deterministic, handy for tests.
    pub fn words() -> Self {
        Self::new(vec![Arc::new(WordCounter)])
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Count tokens. Never fails: falls back to word count when every
    /// provider errors.
    pub fn count_tokens(&self, text: &str) -> usize {
        for provider in &self.providers {
            match provider.try_count(text) {
                Ok(count) => return count,
                Err(e) => debug!("Token provider {} failed: {}", provider.name(), e),
            }
        }
        word_count(text)
    }
}

impl Default for TokenizerChain {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(BpeCounter::new(BpeEncoding::Cl100k)),
            Arc::new(WordCounter),
        ])
    }
}

impl fmt::Debug for TokenizerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenizerChain")
            .field("providers", &self.provider_names())
            .finish()
    }
}

static DEFAULT_CHAIN: Lazy<TokenizerChain> = Lazy::new(TokenizerChain::default);

/// Count tokens with the default chain (cl100k_base, then words).
pub fn count_tokens(text: &str) -> usize {
    DEFAULT_CHAIN.count_tokens(text)
}
