use anyhow::Result;
use clap::Parser;
use dockgate::cli::{Cli, Commands};
use dockgate::commands;
use dockgate::config::Config;
use dockgate::logging;
use tracing::{error, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config first: logging needs the file sink path. Malformed values are
    // reported once the subscriber is up.
    let (config, warnings) = Config::from_env();
    logging::init(config.log_file.as_deref());
    for warning in &warnings {
        warn!("{warning}");
    }

    let result = match cli.cmd {
        Commands::Serve(args) => commands::cmd_serve(args, config).await,
        Commands::Sync(args) => commands::cmd_sync(args, config).await,
        Commands::Policy => commands::cmd_policy(config).await,
    };

    if let Err(e) = &result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }

    result
}
