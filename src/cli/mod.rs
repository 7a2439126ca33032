//! CLI command implementations

pub mod chunks;
pub mod count;
pub mod info;
pub mod keywords;
pub mod optimize;

// ANSI color codes
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const PRIMARY: &str = "\x1b[38;2;100;181;246m";      // #64B5F6
    pub const SUCCESS: &str = "\x1b[38;2;165;214;167m";      // #A5D6A7
    pub const WARNING: &str = "\x1b[38;2;255;245;157m";      // #FFF59D
    pub const ERROR: &str = "\x1b[38;2;239;154;154m";        // #EF9A9A
    pub const ACCENT: &str = "\x1b[38;2;255;202;40m";        // #FFCA28
    pub const MUTED: &str = "\x1b[38;2;84;110;122m";         // #546E7A
    pub const FG: &str = "\x1b[38;2;212;212;215m";           // #D4D4D7
}

pub mod symbols {
    pub const STEPS: &str = "󰓅";
    pub const KEY: &str = "󰌆";
    pub const FILE: &str = "󰈙";
    pub const COUNT: &str = "󰎠";
    pub const SUCCESS: &str = "󰄂";
    pub const ERROR: &str = "󰅚";
    pub const WARNING: &str = "⚠";
    pub const BULLET: &str = "•";
    pub const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
}

/// Width for dividers, bounded so wide terminals don't get a wall of lines
pub fn divider_width() -> usize {
    let (_, cols) = console::Term::stdout().size();
    usize::from(cols).saturating_sub(6).clamp(20, 60)
}

pub fn print_header(icon: &str, title: &str, subtitle: Option<&str>) {
    println!();
    println!(
        "{}{}  {} {}{}",
        colors::PRIMARY, colors::BOLD, icon, title, colors::RESET
    );
    if let Some(subtitle) = subtitle {
        println!("{}  │ {}{}", colors::MUTED, subtitle, colors::RESET);
    }
    println!(
        "{}  ╰{}─{}",
        colors::MUTED, "─".repeat(divider_width()), colors::RESET
    );
    println!();
}

pub fn print_success(message: &str) {
    println!(
        "{}  {} {}{}",
        colors::SUCCESS, symbols::SUCCESS, message, colors::RESET
    );
}

pub fn print_warning(message: &str) {
    println!(
        "{}  {} {}{}",
        colors::WARNING, symbols::WARNING, message, colors::RESET
    );
}

pub fn print_error(message: &str) {
    println!(
        "\n{}  {} Error: {}{}",
        colors::ERROR, symbols::ERROR, message, colors::RESET
    );
}
