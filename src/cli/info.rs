//! Info command - show version, configuration and available providers

use anyhow::Result;

use stepforge::config::{self, Config};
use stepforge::core::parser::Language;
use stepforge::core::tokenizer::{BpeCounter, BpeEncoding, TokenCounter};

const LANGUAGES: [Language; 10] = [
    Language::Rust,
    Language::Python,
    Language::JavaScript,
    Language::TypeScript,
    Language::Html,
    Language::Css,
    Language::Java,
    Language::C,
    Language::Cpp,
    Language::Text,
];

pub fn run(config: &Config) -> Result<()> {
    println!("stepforge v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("System Information:");
    println!("  OS: {} {}", std::env::consts::OS, std::env::consts::ARCH);

    println!();
    println!("Configuration:");
    println!("  Config file: {}", config_file());
    println!(
        "  Limits: {} tokens per step, {} total",
        config.planner.max_tokens_per_step, config.planner.max_token_limit
    );
    println!("  Tokenizer chain: {}", config.tokenizer.providers.join(" → "));

    println!();
    println!("Tokenizers:");
    for encoding in [BpeEncoding::Cl100k, BpeEncoding::O200k] {
        check_encoding(encoding);
    }
    println!("  words: available");

    println!();
    println!("Chunk extraction:");
    for language in LANGUAGES {
        let method = if language.has_grammar() {
            "tree-sitter, patterns"
        } else if language == Language::Text {
            "paragraphs"
        } else {
            "patterns"
        };
        println!("  {}: {}", language, method);
    }

    Ok(())
}

fn config_file() -> String {
    config::config_path()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn check_encoding(encoding: BpeEncoding) {
    let status = match BpeCounter::new(encoding).try_count("") {
        Ok(_) => "available".to_string(),
        Err(e) => format!("unavailable ({})", e),
    };
    println!("  {}: {}", encoding.name(), status);
}
