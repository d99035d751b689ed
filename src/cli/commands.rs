//! CLI commands implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use crate::config::Settings;
use crate::dataset;
use crate::search::SearchRuntime;
use crate::server::{serve_stdio, ToolServer, TOOL_NAMES};

#[derive(Parser)]
#[command(name = "visascout")]
#[command(about = "Visa-sponsorship-aware background job search server")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Serve tool calls as JSON lines over stdin/stdout
    Serve,

    /// List the tools this server dispatches
    Tools,

    /// Load a sponsor dataset and report its shape
    DatasetCheck {
        /// Dataset CSV path (defaults to the configured dataset)
        path: Option<PathBuf>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Serve => {
            let runtime = SearchRuntime::new(settings);
            let server = ToolServer::new(runtime);
            serve_stdio(&server).await
        }
        Commands::Tools => {
            for name in TOOL_NAMES {
                println!("{name}");
            }
            Ok(())
        }
        Commands::DatasetCheck { path } => {
            let path = path.unwrap_or_else(|| settings.dataset_path.clone());
            match dataset::load_company_dataset(&path) {
                Ok(loaded) => {
                    println!(
                        "{} {} rows, {} companies indexed from {}",
                        style("ok").green(),
                        loaded.rows,
                        loaded.by_normalized_company.len(),
                        path.display()
                    );
                    Ok(())
                }
                Err(err) => {
                    println!("{} {}", style("error").red(), err);
                    Err(err.into())
                }
            }
        }
    }
}
