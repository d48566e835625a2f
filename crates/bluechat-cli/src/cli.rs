//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Link backend to use
    #[arg(short, long, value_enum, default_value_t = Backend::Tcp)]
    pub backend: Backend,

    /// Display name sent with every message (overrides the config file)
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Where streams come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Plain TCP sockets, for trying things out without a radio
    Tcp,
    /// BlueZ RFCOMM profiles (Linux, `bluez` feature)
    Bluez,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the interactive chat prompt (the default)
    Chat,
    /// Discover nearby devices for a while and print them
    Scan {
        /// How long to scan, in seconds
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,
    },
    /// Print the paired (bonded) devices
    Paired,
    /// Wait for one peer to connect, then chat
    Listen,
    /// Connect to a peer by address, then chat
    Connect {
        /// Peer address (Bluetooth MAC or host:port)
        address: String,
    },
}
