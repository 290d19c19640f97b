//! voxcal CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;
use voxcal_core::{TracingConfig, TracingOutputFormat, init_tracing};

use voxcal_cli::cli::{Cli, Command, ConfigAction};
use voxcal_cli::commands::{self, Context};
use voxcal_cli::config::ClientConfig;
use voxcal_cli::error::ClientResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let tracing_config = if cli.debug || config.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
            .with_level(Level::WARN)
            .with_format(TracingOutputFormat::Compact)
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {e}");
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    if let Some(ref user) = cli.user {
        config.user_id = user.clone();
    }
    Ok(config)
}

async fn run(cli: Cli, config: ClientConfig) -> ClientResult<()> {
    let config_path = cli.config.unwrap_or_else(ClientConfig::default_path);

    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Path => commands::config::path(&config_path),
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
        },
        Command::Connect { force, no_browser } => {
            let ctx = Context::new(&config)?;
            commands::auth::connect(&ctx, force, no_browser).await
        }
        Command::Status { json } => {
            let ctx = Context::new(&config)?;
            commands::status::status(&ctx, json).await
        }
        Command::Disconnect => {
            let ctx = Context::new(&config)?;
            commands::status::disconnect(&ctx).await
        }
        Command::Events { days, limit, json } => {
            let ctx = Context::new(&config)?;
            commands::events::list(&ctx, days, limit, json).await
        }
    }
}
