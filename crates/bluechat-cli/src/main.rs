//! BlueChat CLI entry point

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bluechat_cli::{
    app::ChatApp, backend::create_adapter, cli::Cli, commands::CommandDispatcher,
    config::AppConfig, error::Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration
    let mut config = load_configuration(&cli)?;
    if let Some(name) = &cli.name {
        config.identity.name = Some(name.clone());
    }

    info!("Initializing {:?} backend...", cli.backend);
    let adapter = match create_adapter(cli.backend, &config).await {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to start backend: {}", e);
            std::process::exit(1);
        }
    };
    let app = ChatApp::new(adapter, config.chat).await?;

    // Execute the command
    if let Err(e) = CommandDispatcher::execute(cli.command, app).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    info!("BlueChat exited");
    Ok(())
}

/// Setup logging; `RUST_LOG` takes precedence over `--verbose`
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr so they do not interleave with the chat transcript
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> Result<AppConfig> {
    if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path);
        AppConfig::load_from_file(config_path)
    } else {
        info!("Using default configuration");
        Ok(AppConfig::default())
    }
}
