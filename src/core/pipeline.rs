//! End-to-end optimization run
//!
//! Reads the optional file, extracts and ranks its chunks against the
//! prompt keywords, then packs everything into steps.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::keywords::{extract_keywords, Keywords};
use super::parser::{CodeParser, Extraction, Language};
use super::planner::{Step, StepPlanner};
use super::relevance::RelevanceScorer;

/// Label used when no file takes part in the run
pub const PROMPT_ONLY_LABEL: &str = "Basic";

/// Everything a run needs besides its inputs
#[derive(Debug, Clone)]
pub struct Settings {
    pub planner: StepPlanner,
    pub scorer: RelevanceScorer,
    pub extraction_timeout: Duration,
    pub max_file_size: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            planner: StepPlanner::default(),
            scorer: RelevanceScorer::default(),
            extraction_timeout: Duration::from_secs(30),
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

/// One prompt and an optional file
#[derive(Debug, Clone, Default)]
pub struct OptimizeRequest {
    pub prompt: String,
    pub file: Option<PathBuf>,
}

impl OptimizeRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Result of a run, ready to render
#[derive(Debug, Clone, Serialize)]
pub struct OptimizeOutcome {
    pub strategy: String,
    pub keywords: Keywords,
    pub steps: Vec<Step>,
    pub total_tokens: usize,
    pub truncated: bool,
    pub relevant_chunks: usize,
    pub total_chunks: usize,
}

impl OptimizeOutcome {
    pub fn step_tokens(&self) -> Vec<usize> {
        self.steps.iter().map(|s| s.tokens).collect()
    }
}

/// Run the whole pipeline synchronously.
pub fn run(request: &OptimizeRequest, settings: &Settings) -> OptimizeOutcome {
    let extraction = request
        .file
        .as_deref()
        .map(|path| extract_file(path, settings.max_file_size));
    plan_extraction(&request.prompt, extraction, settings)
}

/// Extract chunks from `path`. Failures are logged and yield no chunks.
pub fn extract_file(path: &Path, max_file_size: u64) -> Extraction {
    let mut parser = CodeParser::new().with_max_file_size(max_file_size);
    match parser.extract_file(path) {
        Ok(extraction) => extraction,
        Err(e) => {
            warn!("Chunk extraction failed, continuing with prompt only: {}", e);
            Extraction::empty(Language::from_path(path))
        }
    }
}

/// Rank the extracted chunks and plan the steps.
///
/// `extraction` is `None` for prompt-only runs.
pub fn plan_extraction(prompt: &str, extraction: Option<Extraction>, settings: &Settings) -> OptimizeOutcome {
    let keywords = extract_keywords(prompt);
    if keywords.is_empty() {
        debug!("No specific keywords found");
    } else {
        debug!("Keywords found: {}", keywords.joined());
    }

    let (strategy, chunks, scores) = match extraction {
        None => (PROMPT_ONLY_LABEL.to_string(), Vec::new(), Vec::new()),
        Some(extraction) => {
            let ranked = settings.scorer.rank(&extraction.texts(), &keywords);
            let (chunks, scores): (Vec<String>, Vec<f64>) =
                ranked.into_iter().map(|c| (c.text, c.score)).unzip();
            (extraction.strategy.label().to_string(), chunks, scores)
        }
    };

    let relevant_chunks = scores.iter().filter(|&&s| s > 0.0).count();
    if relevant_chunks > 0 {
        info!(
            "Found {} relevant chunks out of {} total",
            relevant_chunks,
            chunks.len()
        );
    } else if !chunks.is_empty() {
        info!("No keyword matches found, processing all {} chunks", chunks.len());
    }

    let plan = settings.planner.plan(prompt, &chunks, Some(&scores));

    OptimizeOutcome {
        strategy,
        keywords,
        total_tokens: plan.total_tokens(),
        truncated: plan.is_truncated(),
        steps: plan.steps,
        relevant_chunks,
        total_chunks: chunks.len(),
    }
}

/// Plain-text rendering used for display and export
pub fn render_text(outcome: &OptimizeOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== OPTIMIZED OUTPUT (Processed with {}) ===", outcome.strategy);
    out.push('\n');

    for (i, step) in outcome.steps.iter().enumerate() {
        let _ = writeln!(out, "--- STEP {} ({} tokens) ---", i + 1, step.tokens);
        out.push_str(&step.text);
        out.push_str("\n\n");
    }

    let _ = writeln!(out, "=== TOTAL TOKENS: {} ===", outcome.total_tokens);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::optimizer::TextOptimizer;
    use crate::core::parser::ExtractionStrategy;
    use crate::core::planner::{PlanLimits, StepKind, PLACEHOLDER};
    use crate::core::tokenizer::TokenizerChain;
    use std::fs;
    use tempfile::TempDir;

    fn settings() -> Settings {
        Settings {
            planner: StepPlanner::new(PlanLimits::default(), TokenizerChain::words(), TextOptimizer::default()),
            ..Default::default()
        }
    }

    #[test]
    fn test_prompt_only_run() {
        let outcome = run(&OptimizeRequest::new("Explain the Tokenizer chain"), &settings());

        assert_eq!(outcome.strategy, PROMPT_ONLY_LABEL);
        assert_eq!(outcome.total_chunks, 0);
        assert_eq!(outcome.steps[0].kind, StepKind::Keywords);
        assert_eq!(outcome.steps[1].kind, StepKind::Prompt);
        assert!(outcome.keywords.contains("Tokenizer"));
        assert_eq!(outcome.total_tokens, outcome.step_tokens().iter().sum::<usize>());
    }

    #[test]
    fn test_file_run_ranks_relevant_chunk_first() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("math.py");
        fs::write(
            &path,
            "def unrelated():\n    return 0\n\n\ndef add_numbers(a, b):\n    # add two values\n    return a + b\n",
        )
        .unwrap();

        let request = OptimizeRequest::new("Explain the add_numbers function").with_file(&path);
        let outcome = run(&request, &settings());

        assert_eq!(outcome.total_chunks, 2);
        assert_eq!(outcome.relevant_chunks, 1);
        assert_ne!(outcome.strategy, PROMPT_ONLY_LABEL);

        let chunk_steps: Vec<&Step> = outcome.steps.iter().filter(|s| s.kind == StepKind::Chunk).collect();
        assert_eq!(chunk_steps.len(), 2);
        assert!(chunk_steps[0].text.starts_with("# Relevance Score:"));
        assert!(chunk_steps[0].text.contains("def add_numbers(a, b):"));
        assert!(chunk_steps[1].text.contains("def unrelated():"));
    }

    #[test]
    fn test_missing_file_falls_back_to_prompt() {
        let request = OptimizeRequest::new("Summarize parser").with_file("/definitely/not/here.rs");
        let outcome = run(&request, &settings());

        assert_eq!(outcome.total_chunks, 0);
        assert_eq!(outcome.strategy, ExtractionStrategy::Empty.label());
        assert!(outcome.steps.iter().all(|s| s.kind != StepKind::Chunk));
        assert!(outcome.steps.iter().any(|s| s.kind == StepKind::Prompt));
    }

    #[test]
    fn test_oversized_file_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.txt");
        fs::write(&path, "word ".repeat(100)).unwrap();

        let extraction = extract_file(&path, 10);
        assert_eq!(extraction.strategy, ExtractionStrategy::Empty);
        assert!(extraction.chunks.is_empty());
    }

    #[test]
    fn test_empty_run_renders_placeholder() {
        let outcome = run(&OptimizeRequest::new(""), &settings());
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].text, PLACEHOLDER);

        let text = render_text(&outcome);
        assert_eq!(
            text,
            "=== OPTIMIZED OUTPUT (Processed with Basic) ===\n\n\
             --- STEP 1 (4 tokens) ---\nNo content to process\n\n\
             === TOTAL TOKENS: 4 ===\n"
        );
    }

    #[test]
    fn test_render_lists_every_step() {
        let outcome = run(&OptimizeRequest::new("Refactor the Cache layer"), &settings());
        let text = render_text(&outcome);

        for (i, step) in outcome.steps.iter().enumerate() {
            assert!(text.contains(&format!("--- STEP {} ({} tokens) ---\n{}", i + 1, step.tokens, step.text)));
        }
        assert!(text.ends_with(&format!("=== TOTAL TOKENS: {} ===\n", outcome.total_tokens)));
    }
}
