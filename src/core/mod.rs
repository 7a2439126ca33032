//! Token-budgeted chunking core
//!
//! Tokenizer, optimizer, chunk extraction, keyword scoring and the step
//! planner, plus the pipeline and worker that drive them.

pub mod keywords;
pub mod optimizer;
pub mod parser;
mod patterns;
pub mod pipeline;
pub mod planner;
pub mod relevance;
pub mod tokenizer;
pub mod worker;

pub use keywords::{extract_keywords, Keywords};
pub use optimizer::{optimize_text, TextOptimizer};
pub use parser::{ChunkExtractor, CodeParser, Extraction, ExtractionStrategy, Language};
pub use pipeline::{OptimizeOutcome, OptimizeRequest, Settings};
pub use planner::{generate_steps, PlanLimits, Step, StepKind, StepPlan, StepPlanner};
pub use relevance::{filter_relevant_blocks, RelevanceScorer, ScoredChunk};
pub use tokenizer::{count_tokens, TokenCounter, TokenizerChain};
pub use worker::{OptimizeWorker, Ticket};
