//! stepforge - token-budgeted prompt and code packing
//!
//! Breaks a prompt and the relevant parts of a source file into steps
//! that each fit a token budget.

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use stepforge::config;

mod cli;

/// stepforge - fit prompts and code into token budgets
#[derive(Parser)]
#[command(name = "stepforge")]
#[command(author = "Mustafa Saraç <mustafa@mustafasarac.com>")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Split prompts and source files into token-bounded steps", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a prompt (and optionally a file) into token-bounded steps
    Optimize {
        /// The prompt to optimize
        prompt: String,

        /// Source file whose relevant chunks are packed after the prompt
        #[arg(short, long)]
        file: Option<String>,

        /// Maximum tokens per step
        #[arg(long)]
        max_step: Option<usize>,

        /// Maximum tokens across all steps
        #[arg(long)]
        max_total: Option<usize>,

        /// Export the plain-text rendering to this file
        #[arg(short, long)]
        output: Option<String>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the keywords extracted from a prompt
    Keywords {
        /// The prompt to analyze
        prompt: String,
    },

    /// List the chunks extracted from a file
    Chunks {
        /// File to split
        file: String,

        /// Score chunks against this prompt's keywords
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Count tokens with the configured tokenizer
    Count {
        /// Text to count
        text: Option<String>,

        /// Count a file's content instead
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Initialize configuration file
        #[arg(long)]
        init: bool,
    },

    /// Show version and system info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins unless --verbose is given
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = if cli.verbose {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let config = config::load_config(cli.config.as_deref())?;

    debug!("stepforge v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(Commands::Optimize {
            prompt,
            file,
            max_step,
            max_total,
            output,
            json,
        }) => {
            let args = cli::optimize::OptimizeArgs {
                file: file.as_deref(),
                max_step,
                max_total,
                output: output.as_deref(),
                json,
            };
            cli::optimize::run(config, &prompt, args).await?;
        }
        Some(Commands::Keywords { prompt }) => {
            cli::keywords::run(&prompt)?;
        }
        Some(Commands::Chunks { file, prompt }) => {
            cli::chunks::run(config, &file, prompt.as_deref())?;
        }
        Some(Commands::Count { text, file }) => {
            cli::count::run(config, text.as_deref(), file.as_deref())?;
        }
        Some(Commands::Config { show, init }) => {
            if init {
                config::init_config(cli.config.as_deref())?;
            } else if show {
                config::show_config(&config)?;
            } else {
                let path = match cli.config.as_deref() {
                    Some(p) => PathBuf::from(p),
                    None => config::config_path()?,
                };
                println!("Config file: {}", path.display());
                println!("Use --show to print it or --init to create it");
            }
        }
        Some(Commands::Info) => {
            cli::info::run(&config)?;
        }
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
