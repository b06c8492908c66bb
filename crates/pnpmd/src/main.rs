//! pnpmd CLI - PNPMD preprocessor.
//!
//! Provides commands for:
//! - `preprocess`: Rewrite PNPMD documents into renderer-ready Markdown
//! - `rules`: Validate and list the symbol map

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{PreprocessArgs, RulesArgs};
use output::Output;

/// pnpmd - PNPMD to Markdown preprocessor.
#[derive(Parser)]
#[command(name = "pnpmd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preprocess PNPMD documents.
    Preprocess(PreprocessArgs),
    /// Validate the symbol map and list its rules.
    Rules(RulesArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let verbose = matches!(&cli.command, Commands::Preprocess(args) if args.verbose);
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Preprocess(args) => args.execute(),
        Commands::Rules(args) => args.execute(),
    };

    if let Err(err) = result {
        output.failure(&err);
        std::process::exit(1);
    }
}
