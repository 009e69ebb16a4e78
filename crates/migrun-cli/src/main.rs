//! migrun CLI - apply and roll back timestamped SQL migrations

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands, GlobalArgs};
use commands::Context;

fn init_tracing(global: &GlobalArgs) {
    let default_level = if global.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if global.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.global);

    let cwd = std::env::current_dir().context("failed to read working directory")?;
    let ctx = Context::load(&cli.global, &cwd)?;

    match &cli.command {
        Commands::Status(args) => commands::status(&ctx, args),
        Commands::Up(args) => commands::up(&ctx, args),
        Commands::Down(args) => commands::down(&ctx, args),
        Commands::Show(args) => commands::show(&ctx, args),
        Commands::Create(args) => commands::create(&ctx, args),
    }
}
