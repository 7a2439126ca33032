//! Count command - token count with the configured tokenizer chain

use anyhow::{bail, Context, Result};
use std::fs;

use stepforge::config::Config;
use stepforge::core::tokenizer::word_count;

use super::{colors, symbols};

pub fn run(config: Config, text: Option<&str>, file: Option<&str>) -> Result<()> {
    let content = match (text, file) {
        (Some(text), None) => text.to_string(),
        (None, Some(file)) => {
            fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?
        }
        (Some(_), Some(_)) => bail!("Pass either TEXT or --file, not both"),
        (None, None) => bail!("Nothing to count: pass TEXT or --file"),
    };

    let chain = config.tokenizer_chain()?;
    let tokens = chain.count_tokens(&content);

    println!(
        "{}{}  {} {} tokens{}  {}({} words, {}){}",
        colors::SUCCESS,
        colors::BOLD,
        symbols::COUNT,
        tokens,
        colors::RESET,
        colors::MUTED,
        word_count(&content),
        chain.provider_names().join(" → "),
        colors::RESET
    );

    Ok(())
}
