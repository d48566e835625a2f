//! BlueChat CLI configuration
//!
//! Loaded from a TOML file given with `--config`; every section and field is
//! optional and falls back to its default.
//!
//! ```toml
//! [identity]
//! name = "Alice"
//!
//! [chat]
//! max_frame_length = 65536
//! connect_timeout = { secs = 10, nanos = 0 }
//!
//! [tcp]
//! listen_address = "127.0.0.1:7700"
//!
//! [[tcp.peers]]
//! name = "Bob"
//! address = "127.0.0.1:7701"
//! ```

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use bluechat_core::{ChatConfig, Device};

use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Configuration Types
// ----------------------------------------------------------------------------

/// Complete configuration for the BlueChat CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Connection lifecycle settings shared by every backend
    pub chat: ChatConfig,

    /// TCP backend settings
    pub tcp: TcpConfig,

    /// Who we are
    pub identity: IdentityConfig,
}

/// Settings for the TCP backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    /// Address `listen` binds to
    pub listen_address: String,

    /// Known peers; they double as the paired and discoverable devices
    pub peers: Vec<PeerEntry>,
}

/// A statically known TCP peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub name: Option<String>,
    pub address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Display name sent with messages; the backend's name is used if unset
    pub name: Option<String>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:7700".to_string(),
            peers: Vec::new(),
        }
    }
}

impl PeerEntry {
    pub fn device(&self) -> Device {
        Device::new(self.name.clone(), self.address.clone())
    }
}

// ----------------------------------------------------------------------------
// Loading and Validation
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        self.chat.validate().map_err(CliError::Config)?;

        self.tcp
            .listen_address
            .parse::<SocketAddr>()
            .map_err(|e| {
                CliError::Config(format!(
                    "Invalid TCP listen address '{}': {}",
                    self.tcp.listen_address, e
                ))
            })?;

        for peer in &self.tcp.peers {
            if peer.address.trim().is_empty() {
                return Err(CliError::Config("TCP peer address must not be empty".to_string()));
            }
        }

        if let Some(name) = &self.identity.name {
            if name.trim().is_empty() {
                return Err(CliError::Config("Identity name must not be blank".to_string()));
            }
        }

        Ok(())
    }
}
