//! Chunks command - list what a file breaks into, optionally scored

use anyhow::{Context, Result};
use std::path::Path;

use stepforge::config::Config;
use stepforge::core::keywords::extract_keywords;
use stepforge::core::parser::{Chunk, CodeParser};

use super::{colors, divider_width, print_error, print_header, symbols};

const PREVIEW_LINES: usize = 3;

pub fn run(config: Config, file: &str, prompt: Option<&str>) -> Result<()> {
    let path = Path::new(file);
    if !path.exists() {
        print_error(&format!("File not found: {}", file));
        return Ok(());
    }

    let settings = config.settings()?;
    let mut parser = CodeParser::new().with_max_file_size(settings.max_file_size);
    let extraction = parser
        .extract_file(path)
        .with_context(|| format!("Failed to extract chunks from {}", file))?;

    let texts = extraction.texts();
    let keywords = prompt.map(extract_keywords).unwrap_or_default();
    let scores = settings.scorer.scores(&texts, &keywords);

    let mut listed: Vec<(&Chunk, f64)> = extraction.chunks.iter().zip(scores).collect();
    if prompt.is_some() {
        // stable, so ties keep file order
        listed.sort_by(|a, b| b.1.total_cmp(&a.1));
    }

    print_header(
        symbols::FILE,
        &format!("{} ({})", file, extraction.language),
        Some(&format!("{} chunks via {}", listed.len(), extraction.strategy)),
    );

    let tokenizer = settings.planner.tokenizer();
    let width = divider_width();

    for (i, (chunk, score)) in listed.iter().enumerate() {
        let name = chunk.name.as_deref().unwrap_or("");
        let score_text = if prompt.is_some() {
            format!("  score {:.2}", score)
        } else {
            String::new()
        };
        let highlight = if *score > 0.0 { colors::ACCENT } else { colors::FG };

        println!(
            "{}{}  {:>3}. {} {} {}{}{}  lines {}-{}  {} tokens{}{}",
            highlight,
            colors::BOLD,
            i + 1,
            chunk.kind.icon(),
            chunk.kind.label(),
            name,
            colors::RESET,
            colors::MUTED,
            chunk.line_start,
            chunk.line_end,
            tokenizer.count_tokens(&chunk.text),
            score_text,
            colors::RESET
        );

        for line in chunk.text.lines().take(PREVIEW_LINES) {
            let preview: String = line.chars().take(width).collect();
            println!("{}       │ {}{}", colors::MUTED, preview, colors::RESET);
        }
    }
    println!();

    Ok(())
}
