//! Keyword extraction from prompts

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));
static CAPITALIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z][A-Za-z0-9_]*\b").expect("valid regex"));

/// Words that never count as keywords
pub const STOPLIST: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "if", "then", "else", "when", "at", "from", "by",
    "for", "with", "about", "to", "in", "on", "is", "are", "was", "were", "be", "been", "being",
    "have", "has", "had", "do", "does", "did", "can", "could", "will", "would", "should", "shall",
    "may", "might", "must", "of", "that", "this", "these", "those", "it", "its", "it's", "their",
    "there", "here", "where", "how", "what", "why", "who", "whom", "whose", "which", "while", "i",
    "me", "my", "mine", "you", "your", "yours", "they", "them", "as", "so", "just", "very",
    "really", "code", "function", "class", "method", "variable", "object", "file", "program",
    "script", "data", "value", "type", "return", "input", "output",
];

const MIN_KEYWORD_LEN: usize = 3;

static STOPLIST_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOPLIST.iter().copied().collect());

/// Deduplicated keywords in first-appearance order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Keywords {
    words: Vec<String>,
}

impl Keywords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a keyword unless it is already present. Returns whether it was added.
    pub fn insert(&mut self, word: impl Into<String>) -> bool {
        let word = word.into();
        if self.contains(&word) {
            return false;
        }
        self.words.push(word);
        true
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    pub fn to_set(&self) -> HashSet<String> {
        self.words.iter().cloned().collect()
    }

    /// Comma-separated listing
    pub fn joined(&self) -> String {
        self.words.join(", ")
    }
}

impl<S: Into<String>> FromIterator<S> for Keywords {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut keywords = Keywords::new();
        for word in iter {
            keywords.insert(word);
        }
        keywords
    }
}

pub fn is_stopword(word: &str) -> bool {
    STOPLIST_SET.contains(word.to_lowercase().as_str())
}

/// Pull the significant terms out of a prompt.
///
/// Lowercased words of at least three characters that aren't on the
/// stoplist, followed by capitalized identifiers from the original text
/// (`Calculator`, `HttpClient`) that aren't already present.
pub fn extract_keywords(prompt: &str) -> Keywords {
    let lowered = prompt.to_lowercase();
    let cleaned = NON_WORD.replace_all(&lowered, " ");

    let mut keywords: Keywords = cleaned
        .split_whitespace()
        .filter(|word| word.chars().count() >= MIN_KEYWORD_LEN && !STOPLIST_SET.contains(word))
        .collect();

    for found in CAPITALIZED.find_iter(prompt) {
        let word = found.as_str();
        if !is_stopword(word) {
            keywords.insert(word);
        }
    }

    keywords
}
