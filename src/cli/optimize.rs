//! Optimize command - pack a prompt and a file into token-bounded steps

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;
use std::time::Duration;

use stepforge::config::Config;
use stepforge::core::pipeline::{render_text, OptimizeOutcome, OptimizeRequest};
use stepforge::core::planner::StepKind;
use stepforge::core::worker::OptimizeWorker;

use super::{colors, print_header, print_success, print_warning, symbols};

/// Flags accepted by `stepforge optimize`
#[derive(Debug, Default)]
pub struct OptimizeArgs<'a> {
    pub file: Option<&'a str>,
    pub max_step: Option<usize>,
    pub max_total: Option<usize>,
    pub output: Option<&'a str>,
    pub json: bool,
}

pub async fn run(mut config: Config, prompt: &str, args: OptimizeArgs<'_>) -> Result<()> {
    if let Some(max_step) = args.max_step {
        config.planner.max_tokens_per_step = max_step;
    }
    if let Some(max_total) = args.max_total {
        config.planner.max_token_limit = max_total;
    }
    let settings = config.settings()?;

    let mut request = OptimizeRequest::new(prompt);
    if let Some(file) = args.file {
        if !Path::new(file).exists() && !args.json {
            print_warning(&format!("File not found: {} (continuing with prompt only)", file));
        }
        request = request.with_file(file);
    }

    let spinner = if args.json { ProgressBar::hidden() } else { spinner() };

    let worker = OptimizeWorker::new(settings);
    let outcome = worker.submit(request).wait().await;
    spinner.finish_and_clear();

    let Some(outcome) = outcome else {
        bail!("Optimization did not complete");
    };

    if args.json {
        let json = serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?;
        println!("{}", json);
    } else {
        print_outcome(&outcome, args.file);
    }

    if let Some(output) = args.output {
        fs::write(output, render_text(&outcome))
            .with_context(|| format!("Failed to write output to {}", output))?;
        if !args.json {
            print_success(&format!("Output saved to {}", output));
        }
    }

    Ok(())
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&symbols::SPINNER)
            .template("  {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Generating optimized steps...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

// ============================================
// UI Functions
// ============================================

fn print_outcome(outcome: &OptimizeOutcome, file: Option<&str>) {
    print_header(
        symbols::STEPS,
        "Optimized Output",
        Some(&format!("Processed with {}", outcome.strategy)),
    );

    if outcome.keywords.is_empty() {
        println!("{}  No specific keywords found{}", colors::MUTED, colors::RESET);
    } else {
        println!(
            "{}  {} Keywords: {}{}{}",
            colors::MUTED, symbols::KEY, colors::ACCENT, outcome.keywords.joined(), colors::RESET
        );
    }

    if let Some(file) = file {
        if outcome.relevant_chunks > 0 {
            println!(
                "{}  {} {}: {} relevant of {} chunks{}",
                colors::MUTED, symbols::FILE, file, outcome.relevant_chunks, outcome.total_chunks, colors::RESET
            );
        } else {
            println!(
                "{}  {} {}: no keyword matches, all {} chunks kept{}",
                colors::MUTED, symbols::FILE, file, outcome.total_chunks, colors::RESET
            );
        }
    }
    println!();

    for (i, step) in outcome.steps.iter().enumerate() {
        let color = match step.kind {
            StepKind::Keywords => colors::ACCENT,
            StepKind::Truncated => colors::WARNING,
            _ => colors::PRIMARY,
        };
        println!(
            "{}--- STEP {} ({} tokens) ---{}",
            color,
            i + 1,
            step.tokens,
            colors::RESET
        );
        println!("{}{}{}", colors::FG, step.text, colors::RESET);
        println!();
    }

    println!(
        "{}{}=== TOTAL TOKENS: {} ==={}",
        colors::SUCCESS, colors::BOLD, outcome.total_tokens, colors::RESET
    );
    if outcome.truncated {
        print_warning("Output truncated at the token limit");
    }
    println!();
}
