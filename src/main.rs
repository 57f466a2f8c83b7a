//! Grove CLI entry point

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "grove")]
#[command(about = "Workspace state cache for grove sources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Workspace folders (defaults to the current directory)
    #[arg(short, long = "root", default_value = ".")]
    roots: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the session API and follow changes on disk
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "7890")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Do not watch the folders for changes
        #[arg(long)]
        no_watch: bool,
    },
    /// List the views the folders define
    Views,
    /// Load every view and print its diagnostics
    Check,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("grove={}", log_level))),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Grove v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { port, host, no_watch } => commands::serve(cli.roots, host, port, !no_watch).await,
        Commands::Views => commands::views(cli.roots).await,
        Commands::Check => commands::check(cli.roots).await,
        Commands::Version => {
            println!("Grove v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
