//! RosterSync CLI
//!
//! Command-line interface for roster reconciliation

use clap::{Parser, Subcommand};
use rostersync_core::logging_facility::{init, Profile};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "rostersync")]
#[command(about = "RosterSync - Reconcile a school roster with its target systems", long_about = None)]
struct Cli {
    /// Emit JSON logs (for scheduled runs)
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List registered adapters and their configuration fields
    Schema(commands::schema::SchemaArgs),
    /// Show what a run would change, per target
    Preview(commands::preview::PreviewArgs),
    /// Preview, then write the changes to every target
    Apply(commands::apply::ApplyArgs),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init(if cli.json_logs {
        Profile::Production
    } else {
        Profile::Development
    });

    let result = match cli.command {
        Commands::Schema(args) => commands::schema::execute(args),
        Commands::Preview(args) => commands::preview::execute(args).await,
        Commands::Apply(args) => commands::apply::execute(args).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
