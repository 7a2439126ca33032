//! Text optimization
//!
//! Strips comments and redundant whitespace from code, and filler words
//! from prose, to cut token usage before packing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

static HTML_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<!--[\s\S]*?-->").expect("valid regex"));
static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\*[\s\S]*?\*/").expect("valid regex"));
static HASH_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)#.*$").expect("valid regex"));
static SLASH_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)//.*$").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static INLINE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));
static NON_PROSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s.,-]").expect("valid regex"));

/// English stopwords dropped from prose
pub const STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan", "shan't",
    "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't", "wouldn",
    "wouldn't",
];

static STOPWORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOPWORDS.iter().copied().collect());

/// Optimizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Drop English stopwords from prose
    pub remove_stopwords: bool,
    /// Keep one code line per source line instead of flattening to a single line
    pub preserve_line_breaks: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            remove_stopwords: true,
            preserve_line_breaks: true,
        }
    }
}

/// Pure string-to-string optimizer
#[derive(Debug, Clone, Default)]
pub struct TextOptimizer {
    config: OptimizerConfig,
}

impl TextOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimize `text` as code or as prose. Never fails: prose that can't be
    /// reduced comes back whitespace-normalized.
    pub fn optimize(&self, text: &str, is_code: bool) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        if is_code {
            return self.optimize_code(text);
        }

        let collapsed = collapse_whitespace(text);
        match self.optimize_prose(&collapsed) {
            Some(optimized) => optimized,
            None => {
                debug!("Prose optimization produced nothing, keeping original text");
                collapsed
            }
        }
    }

    fn optimize_code(&self, text: &str) -> String {
        let stripped = strip_comments(text);

        if self.config.preserve_line_breaks {
            stripped
                .lines()
                .map(|line| INLINE_WHITESPACE.replace_all(line, " ").trim().to_string())
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            collapse_whitespace(&stripped)
        }
    }

    fn optimize_prose(&self, collapsed: &str) -> Option<String> {
        let cleaned = NON_PROSE.replace_all(collapsed, "");
        let cleaned = cleaned.trim();
        let ends_with_period = cleaned.ends_with('.');

        let sentences: Vec<String> = cleaned
            .split('.')
            .map(|sentence| {
                sentence
                    .split_whitespace()
                    .filter(|word| self.keep_word(word))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|sentence| !sentence.is_empty())
            .collect();

        if sentences.is_empty() {
            return None;
        }

        let mut result = sentences.join(". ");
        if ends_with_period {
            result.push('.');
        }
        Some(result)
    }

    fn keep_word(&self, word: &str) -> bool {
        if !word.chars().any(char::is_alphanumeric) {
            return false;
        }
        if self.config.remove_stopwords {
            let bare = word.trim_matches(|c: char| c == ',' || c == '-').to_lowercase();
            if STOPWORD_SET.contains(bare.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Optimize with default settings.
pub fn optimize_text(text: &str, is_code: bool) -> String {
    TextOptimizer::default().optimize(text, is_code)
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Remove block and line comments. Runs to a fixpoint since removing one
/// comment can splice together the opener of another.
fn strip_comments(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = HTML_COMMENT.replace_all(&current, "");
        let next = BLOCK_COMMENT.replace_all(&next, "");
        let next = HASH_COMMENT.replace_all(&next, "");
        let next = SLASH_COMMENT.replace_all(&next, "").into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_comments_removed() {
        let code = "# header\ndef add(a, b):  # inline\n    return a + b  // trailing\n/* block\ncomment */x = 1\n<!-- html -->y";
        let optimized = optimize_text(code, true);
        assert_eq!(optimized, "def add(a, b):\nreturn a + b\nx = 1\ny");
    }

    #[test]
    fn test_code_flattened_when_line_breaks_dropped() {
        let optimizer = TextOptimizer::new(OptimizerConfig {
            preserve_line_breaks: false,
            ..Default::default()
        });
        let code = "fn main() {\n    // say hi\n    println!(\"hi\");\n}\n";
        assert_eq!(optimizer.optimize(code, true), "fn main() { println!(\"hi\"); }");
    }

    #[test]
    fn test_code_optimization_is_idempotent() {
        let samples = [
            "def f():\n    # c\n    return 1\n\n\nclass A:  pass",
            "x/* a */*/ y",
            "<!/* c */-- hidden -->visible",
            "a//* c */b\n  \t q",
            "   ",
            "int main() { return 0; } /* unterminated",
        ];
        let flat = TextOptimizer::new(OptimizerConfig {
            preserve_line_breaks: false,
            ..Default::default()
        });
        let lined = TextOptimizer::default();

        for sample in samples {
            for optimizer in [&flat, &lined] {
                let once = optimizer.optimize(sample, true);
                let twice = optimizer.optimize(&once, true);
                assert_eq!(once, twice, "not idempotent for {:?}", sample);
            }
        }
    }

    #[test]
    fn test_prose_drops_stopwords_and_symbols() {
        let optimized = optimize_text("Explain   the add_numbers   function!", false);
        assert_eq!(optimized, "Explain add_numbers function");
    }

    #[test]
    fn test_prose_keeps_sentence_boundaries() {
        let optimized = optimize_text("This is the first part. And here is a second one.", false);
        assert_eq!(optimized, "first part. second one.");
    }

    #[test]
    fn test_prose_of_only_stopwords_falls_back() {
        assert_eq!(optimize_text("what is  this", false), "what is this");
    }

    #[test]
    fn test_stopwords_can_be_kept() {
        let optimizer = TextOptimizer::new(OptimizerConfig {
            remove_stopwords: false,
            ..Default::default()
        });
        assert_eq!(optimizer.optimize("Explain the code @ once", false), "Explain the code once");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(optimize_text("", true), "");
        assert_eq!(optimize_text("", false), "");
        assert_eq!(optimize_text(" \n\t", false), "");
    }
}
