//! Link backends the CLI can drive

use std::sync::Arc;

use bluechat_core::BluetoothAdapter;

use crate::cli::Backend;
use crate::config::AppConfig;
use crate::error::Result;

#[cfg(all(target_os = "linux", feature = "bluez"))]
pub mod bluez;
pub mod tcp;

/// Build the adapter selected on the command line
pub async fn create_adapter(backend: Backend, config: &AppConfig) -> Result<Arc<dyn BluetoothAdapter>> {
    let local_name = config.identity.name.clone();
    match backend {
        Backend::Tcp => Ok(Arc::new(tcp::TcpAdapter::new(&config.tcp, local_name))),
        Backend::Bluez => bluez_adapter(local_name).await,
    }
}

#[cfg(all(target_os = "linux", feature = "bluez"))]
async fn bluez_adapter(local_name: Option<String>) -> Result<Arc<dyn BluetoothAdapter>> {
    Ok(Arc::new(bluez::BluezAdapter::new(local_name).await?))
}

#[cfg(not(all(target_os = "linux", feature = "bluez")))]
async fn bluez_adapter(_local_name: Option<String>) -> Result<Arc<dyn BluetoothAdapter>> {
    Err(crate::error::CliError::FeatureNotAvailable(
        "the BlueZ backend needs Linux and the `bluez` feature".to_string(),
    ))
}
