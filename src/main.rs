use std::process::ExitCode;

use clap::Parser;
use secret_broker::{
    cli::{self, Cli},
    observability::{init_observability, log_config_info},
    AppConfig, APP_NAME, VERSION,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(cli::exit_code(&e))
        }
    }
}

async fn run() -> anyhow::Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    // This must happen before any config is read from environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let mut config = AppConfig::from_env_with_provider(cli.provider)?;
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }

    init_observability(&config.observability).await?;
    info!(app_name = APP_NAME, version = VERSION, "Starting secret broker");
    log_config_info(&config);

    cli::run(cli, &config).await
}
