//! Command handlers for the BlueChat CLI

use std::time::Duration;

use tracing::info;

use crate::app::{print_devices, ChatApp};
use crate::cli::Commands;
use crate::error::Result;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command; no subcommand means the interactive prompt
    pub async fn execute(command: Option<Commands>, mut app: ChatApp) -> Result<()> {
        match command.unwrap_or(Commands::Chat) {
            Commands::Chat => app.run_interactive(None).await,
            Commands::Scan { seconds } => Self::handle_scan_command(app, seconds).await,
            Commands::Paired => Self::handle_paired_command(app).await,
            Commands::Listen => {
                let events = app.controller().listen()?;
                info!("Waiting for a peer to connect...");
                app.run_interactive(Some(events)).await
            }
            Commands::Connect { address } => {
                let device = app.resolve_device(&address);
                info!("Connecting to {}...", device);
                let events = app.controller().connect(device)?;
                app.run_interactive(Some(events)).await
            }
        }
    }

    async fn handle_scan_command(app: ChatApp, seconds: u64) -> Result<()> {
        info!("Scanning for {} seconds...", seconds);
        let devices = app.scan(Duration::from_secs(seconds)).await?;
        print_devices("Discovered devices", &devices);
        app.shutdown().await;
        Ok(())
    }

    async fn handle_paired_command(app: ChatApp) -> Result<()> {
        let devices = app.paired().await?;
        print_devices("Paired devices", &devices);
        app.shutdown().await;
        Ok(())
    }
}
