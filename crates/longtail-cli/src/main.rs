//! Longtail CLI - train return predictors and score new data from the shell.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use longtail_cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("longtail=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("Longtail CLI starting...");

    match cli.command {
        Commands::Train(cmd) => cmd.run()?,
        Commands::Predict(cmd) => cmd.run()?,
    }

    info!("Longtail CLI completed successfully");
    Ok(())
}
