//! Codehash CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "codehash")]
#[command(about = "Content-derived identities for Python functions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Manifest describing the modules to load
    #[arg(short, long, default_value = "codehash.toml")]
    manifest: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the identity of a function
    Hash {
        /// Function to hash, as module:function
        target: String,
    },
    /// Print the canonical code shape of a function
    Shape {
        /// Function to normalize, as module:function
        target: String,
    },
    /// Print the identity, code shape and dependency tokens as JSON
    Explain {
        /// Function to explain, as module:function
        target: String,
    },
    /// Show version
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("codehash={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Hash { target } => commands::hash(&cli.manifest, &target),
        Commands::Shape { target } => commands::shape(&cli.manifest, &target),
        Commands::Explain { target } => commands::explain(&cli.manifest, &target),
        Commands::Version => {
            println!("codehash v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
