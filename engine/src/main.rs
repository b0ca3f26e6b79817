// Scout sales-research agent
// Main entry point for the scout binary

use clap::Parser;
use scout_engine::cli::{Cli, Command};
use scout_engine::config::Config;
use scout_engine::handlers::{
    handle_config, handle_history, handle_opportunities, handle_replay, handle_run, hinted,
    OutputFormat, RunOptions,
};
use scout_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path).map_err(hinted)?
    } else {
        Config::load_or_create().map_err(hinted)?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Scout v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Run {
            domain,
            name,
            workflow,
            roles,
            max_iterations,
            budget,
            notes,
            concurrent,
        } => {
            let options = RunOptions {
                domain,
                name,
                workflow,
                roles,
                max_iterations,
                budget,
                notes,
                concurrent,
            };
            handle_run(options, &config, format).await
        }

        Command::Opportunities { limit } => handle_opportunities(limit, &config, format).await,

        Command::History { limit } => {
            tracing::info!("Showing last {} runs", limit);
            handle_history(limit, &config, format).await
        }

        Command::Replay { run_id } => {
            tracing::info!("Replaying run: {}", run_id);
            handle_replay(run_id, &config, format).await
        }

        Command::Config => handle_config(&config, format),
    }
}
