//! keylight CLI
//!
//! Loads the configuration, then dispatches to a command handler.

use clap::Parser;
use tracing::debug;

use keylight::KeylightConfig;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;
use commands::{Context, RunOptions};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the preview can own stdout
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.unwrap_or_else(KeylightConfig::default_path);
    debug!("Loading config from {:?}", config_path);
    let config = KeylightConfig::load(&config_path)?;
    let ctx = Context {
        config,
        config_path,
    };

    match cli.command {
        Commands::Layout { json } => commands::layout::show(&ctx, json),
        Commands::Effects { name: None } => commands::effects::list(&ctx),
        Commands::Effects { name: Some(name) } => commands::effects::show(&ctx, &name),
        Commands::Config { write } => commands::config::show(&ctx, write),
        Commands::Run {
            effect,
            vars,
            keys,
            mode,
            fps,
            preview,
            duration,
        } => commands::run::run(
            &ctx,
            RunOptions {
                effect,
                vars,
                keys,
                mode,
                fps,
                preview,
                duration,
            },
        ),
    }
}
