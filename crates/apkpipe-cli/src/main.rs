//! apkpipe - Android build pipeline orchestrator

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use apkpipe_cli::cmd;
use apkpipe_cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_path();

    match cli.command {
        Commands::Build { until, strict } => cmd::build::build(config, until.as_deref(), strict),
        Commands::Unpack => cmd::unpack::unpack(config),
        Commands::Conflicts => cmd::conflicts::conflicts(config),
        Commands::Toolchain { json } => cmd::toolchain::toolchain(config, json),
        Commands::Clean => cmd::clean::clean(config),
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}
