//! cadence CLI - load, inspect and run pipeline topologies.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(author, version, about = "cadence pipeline core CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a topology file and print a summary
    Check(commands::check::CheckArgs),

    /// Print the order a graph walk visits components in
    Walk(commands::walk::WalkArgs),

    /// Start every pipeline of a topology and run it for a while
    Run(commands::run::RunArgs),

    /// List the component drivers topologies can use
    Drivers(commands::drivers::DriversArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `--json` output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => commands::check::run(args),
        Commands::Walk(args) => commands::walk::run(args),
        Commands::Run(args) => commands::run::run(args),
        Commands::Drivers(args) => commands::drivers::run(args),
    }
}
