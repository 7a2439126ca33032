//! Keyword relevance scoring for extracted chunks

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::keywords::Keywords;
use super::tokenizer::word_count;

/// Score contributions per keyword. Empirical values, tune freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Per whole-word match
    pub whole_word: f64,
    /// Flat bonus when the keyword occurs anywhere
    pub substring: f64,
    /// Keyword is part of a name right after a definition introducer
    pub definition: f64,
    /// Keyword appears in a trailing `#` or `//` comment
    pub comment: f64,
    pub definition_introducers: Vec<String>,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            whole_word: 2.0,
            substring: 1.0,
            definition: 5.0,
            comment: 3.0,
            definition_introducers: vec!["def".to_string(), "class".to_string(), "function".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Keep chunks that matched nothing (ranked last) when others matched
    pub keep_unmatched: bool,
    pub weights: ScoringWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            keep_unmatched: true,
            weights: ScoringWeights::default(),
        }
    }
}

/// A chunk with its relevance score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub text: String,
    pub score: f64,
}

/// Per-keyword matchers, compiled once per ranking run
struct KeywordPatterns {
    needle: String,
    whole_word: Option<Regex>,
    definition: Option<Regex>,
    comment: Option<Regex>,
}

impl KeywordPatterns {
    fn compile(keyword: &str, introducers: &[String]) -> Self {
        let needle = keyword.to_lowercase();
        let escaped = regex::escape(&needle);

        let introducers = introducers
            .iter()
            .map(|i| regex::escape(&i.to_lowercase()))
            .collect::<Vec<_>>()
            .join("|");

        let definition = if introducers.is_empty() {
            None
        } else {
            compile(&format!(r"\b(?:{})\s+\w*{}\w*", introducers, escaped))
        };

        Self {
            whole_word: compile(&format!(r"\b{}\b", escaped)),
            definition,
            comment: compile(&format!(r"(?:#|//)[^\n]*{}", escaped)),
            needle,
        }
    }
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            debug!("Skipping pattern {}: {}", pattern, e);
            None
        }
    }
}

/// Scores chunks against prompt keywords
#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    config: ScoringConfig,
}

impl RelevanceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Length-normalized relevance of one chunk. Zero when there are no keywords.
    pub fn score(&self, chunk: &str, keywords: &Keywords) -> f64 {
        if keywords.is_empty() {
            return 0.0;
        }
        let patterns = self.compile(keywords);
        self.score_with(chunk, &patterns)
    }

    /// Scores for `chunks`, index-aligned, without reordering
    pub fn scores(&self, chunks: &[String], keywords: &Keywords) -> Vec<f64> {
        if keywords.is_empty() {
            return vec![0.0; chunks.len()];
        }
        let patterns = self.compile(keywords);
        chunks.iter().map(|c| self.score_with(c, &patterns)).collect()
    }

    /// Rank chunks by descending score, ties keeping extraction order.
    ///
    /// Without keywords, or when nothing matches, chunks come back in their
    /// original order with zero scores.
    pub fn rank(&self, chunks: &[String], keywords: &Keywords) -> Vec<ScoredChunk> {
        let unscored = || {
            chunks
                .iter()
                .map(|text| ScoredChunk {
                    text: text.clone(),
                    score: 0.0,
                })
                .collect::<Vec<_>>()
        };

        if keywords.is_empty() {
            return unscored();
        }

        let mut scored: Vec<ScoredChunk> = chunks
            .iter()
            .zip(self.scores(chunks, keywords))
            .map(|(text, score)| ScoredChunk {
                text: text.clone(),
                score,
            })
            .collect();

        if scored.iter().all(|c| c.score <= 0.0) {
            return unscored();
        }

        if !self.config.keep_unmatched {
            scored.retain(|c| c.score > 0.0);
        }

        // Vec::sort_by is stable, so equal scores keep extraction order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored
    }

    fn compile(&self, keywords: &Keywords) -> Vec<KeywordPatterns> {
        keywords
            .iter()
            .map(|k| KeywordPatterns::compile(k, &self.config.weights.definition_introducers))
            .collect()
    }

    fn score_with(&self, chunk: &str, patterns: &[KeywordPatterns]) -> f64 {
        let weights = &self.config.weights;
        let lowered = chunk.to_lowercase();
        let mut raw = 0.0;

        for keyword in patterns {
            if let Some(re) = &keyword.whole_word {
                raw += weights.whole_word * re.find_iter(&lowered).count() as f64;
            }
            if lowered.contains(&keyword.needle) {
                raw += weights.substring;
            }
            if keyword.definition.as_ref().is_some_and(|re| re.is_match(&lowered)) {
                raw += weights.definition;
            }
            if keyword.comment.as_ref().is_some_and(|re| re.is_match(&lowered)) {
                raw += weights.comment;
            }
        }

        raw / (word_count(chunk) + 1) as f64
    }
}

/// Rank chunks with default weights.
pub fn filter_relevant_blocks(chunks: &[String], keywords: &Keywords) -> Vec<ScoredChunk> {
    RelevanceScorer::default().rank(chunks, keywords)
}
