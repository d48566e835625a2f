//! Error handling for the BlueChat CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Chat core error: {0}")]
    Chat(#[from] bluechat_core::ChatError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend initialization failed: {0}")]
    BackendInit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    #[error("Feature not available: {0}")]
    FeatureNotAvailable(String),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
