// Abstract screener
// Main entry point for the screener binary

use clap::Parser;
use screener_engine::cli::{AdminAction, Cli, Command};
use screener_engine::config::Config;
use screener_engine::handlers::{
    handle_admin_progress, handle_admin_refresh_user, handle_admin_reset, handle_admin_responses,
    handle_import, handle_init, handle_review, handle_status, OutputFormat,
};
use screener_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = match &cli.config {
        Some(config_path) => Config::load_or_create_at(config_path),
        None => Config::load_or_create(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            init_telemetry();
            tracing::error!("{}", e);
            return Err(e.into());
        }
    };

    // --log wins over the config file; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::info!("Screener v{} ({} - {})", version, commit, timestamp);

    match cli.command {
        Command::Init => handle_init(&config, format).await,

        Command::Import { file } => {
            tracing::info!("Importing catalog from {}", file.display());
            handle_import(&file, &config, format).await
        }

        Command::Review { reviewer } => handle_review(&reviewer, &config).await,

        Command::Status { reviewer } => handle_status(&reviewer, &config, format).await,

        Command::Admin { action } => {
            tracing::info!("Admin action: {:?}", action);
            match action {
                AdminAction::Responses { reviewer } => {
                    handle_admin_responses(reviewer.as_deref(), &config, format).await
                }
                AdminAction::Progress => handle_admin_progress(&config, format).await,
                AdminAction::Reset { yes } => handle_admin_reset(yes, &config, format).await,
                AdminAction::RefreshUser { reviewer } => {
                    handle_admin_refresh_user(&reviewer, &config, format).await
                }
            }
        }
    }
}
