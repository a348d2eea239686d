//! Trellis CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Component discovery and migration complexity for BI metadata exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Working root holding trellis.toml, .env and the .trellis cache
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Split, discover, classify and aggregate a document
    Analyze {
        /// Exported metadata document (.twb, .xml)
        file: PathBuf,

        /// Write the snapshot here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ignore and do not write the snapshot cache
        #[arg(long)]
        no_cache: bool,

        /// Override the classifier provider (rules, remote)
        #[arg(long)]
        classifier: Option<String>,
    },
    /// Split a document into units and list them
    Split {
        file: PathBuf,

        /// Byte budget per unit
        #[arg(long)]
        budget: Option<usize>,

        /// Recursion ceiling
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Clear the snapshot cache
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("trellis={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Trellis v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Working root: {}", cli.root.display());

    match cli.command {
        Commands::Analyze {
            file,
            output,
            no_cache,
            classifier,
        } => {
            let options = commands::AnalyzeOptions {
                output,
                no_cache,
                classifier,
            };
            commands::analyze(cli.root, file, options).await
        }
        Commands::Split {
            file,
            budget,
            max_depth,
        } => commands::split(cli.root, file, budget, max_depth).await,
        Commands::Clear => commands::clear(cli.root),
        Commands::Version => {
            println!("Trellis v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
