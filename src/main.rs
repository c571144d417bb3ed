use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use marketsnap::cli::{Cli, Commands};
use marketsnap::config::Config;
use marketsnap::dispatcher::dispatch_command;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for tables and JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(!cli.no_color)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = Config::load(cli.config.as_deref())?;
    let command = cli.command.unwrap_or(Commands::Show {
        as_of: None,
        refresh: false,
    });

    dispatch_command(command, &config, cli.json).await
}
