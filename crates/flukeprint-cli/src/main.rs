mod corpus;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use common::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "flukeprint")]
#[command(about = "Distributed image-embedding and triplet-mining pipeline")]
struct Cli {
    /// TOML configuration file; defaults apply when it does not exist.
    #[arg(long, default_value = "flukeprint.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compute embeddings for the corpus and persist the checkpoint.
    Embed,
    /// Mine training triplets from the persisted checkpoint.
    Mine,
    /// Report distance statistics over the persisted triplets.
    Stats,
    /// Full pipeline: embed, mine, stats.
    Run,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Embed => pipeline::run_embed(&cfg),
        Commands::Mine => pipeline::run_mine(&cfg),
        Commands::Stats => pipeline::run_stats(&cfg),
        Commands::Run => pipeline::run_all(&cfg),
    }
}
