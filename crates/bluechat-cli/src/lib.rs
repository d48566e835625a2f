//! BlueChat CLI library
//!
//! Components of the `bluechat` binary: argument parsing, the configuration
//! file, link backends and the interactive chat prompt.

pub mod app;
pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod input;

pub use app::ChatApp;
pub use cli::{Backend, Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
