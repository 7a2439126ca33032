//! Keywords command - show what the prompt will be matched on

use anyhow::Result;

use stepforge::core::keywords::extract_keywords;

use super::{colors, print_header, symbols};

pub fn run(prompt: &str) -> Result<()> {
    let keywords = extract_keywords(prompt);

    print_header(symbols::KEY, "Keywords", Some(prompt));

    if keywords.is_empty() {
        println!("{}  No specific keywords found{}", colors::MUTED, colors::RESET);
        println!();
        return Ok(());
    }

    for keyword in keywords.iter() {
        println!(
            "{}  {} {}{}{}",
            colors::MUTED, symbols::BULLET, colors::ACCENT, keyword, colors::RESET
        );
    }
    println!();
    println!("{}  {} keywords{}", colors::MUTED, keywords.len(), colors::RESET);
    println!();

    Ok(())
}
