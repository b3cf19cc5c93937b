// Shipwright Engine
// Main entry point for the shipwright binary

use clap::Parser;
use shipwright_engine::cli::{Cli, Command, ConfigAction};
use shipwright_engine::config::Config;
use shipwright_engine::handlers::{
    handle_config_show, handle_config_validate, handle_plan, handle_run, handle_templates,
    OutputFormat,
};
use shipwright_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Validation reports on the file itself, so it must not go through the loader first
    if let Command::Config {
        action: ConfigAction::Validate,
    } = &cli.command
    {
        init_telemetry();
        return handle_config_validate(cli.config.as_deref(), format);
    }

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // RUST_LOG still wins over both
    let level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(level);

    tracing::info!("Shipwright Engine v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Templates { project_type } => handle_templates(&project_type, format).await,

        Command::Plan {
            project_type,
            project,
        } => {
            tracing::info!("Planning {} project '{}'", project_type, project.name);
            handle_plan(&project_type, &project, &config, format).await
        }

        Command::Run {
            project_type,
            project,
            parallel,
        } => {
            tracing::info!("Running {} project '{}'", project_type, project.name);
            handle_run(&project_type, &project, parallel, &config, format).await
        }

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
            ConfigAction::Validate => handle_config_validate(cli.config.as_deref(), format),
        },
    }
}
