//! Error types for BlueChat
//!
//! Every failure of a listen/connect session, a send, or a gated controller
//! operation is reported through [`ChatError`]. Malformed payloads are not an
//! error: the codec degrades instead (see [`crate::codec`]).

use std::time::Duration;

use thiserror::Error;

use crate::types::Permission;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors produced by the chat core
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Permission not granted: {permission}")]
    PermissionDenied { permission: Permission },

    #[error("Can't connect to a non-paired device: {address}")]
    NotPaired { address: String },

    #[error("No active connection")]
    NotConnected,

    #[error("Connection lost to {address}")]
    ConnectionLost { address: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Bluetooth adapter error: {reason}")]
    Adapter { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

impl ChatError {
    /// Create an adapter error from any displayable cause
    pub fn adapter(reason: impl std::fmt::Display) -> Self {
        ChatError::Adapter {
            reason: reason.to_string(),
        }
    }

    /// Whether the failure came from the byte stream itself
    pub fn is_io(&self) -> bool {
        matches!(self, ChatError::Io(_))
    }
}

/// Result type for chat core operations
pub type Result<T> = std::result::Result<T, ChatError>;
