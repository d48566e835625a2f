//! Shared data types: devices, messages, connection events and status

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Service Record
// ----------------------------------------------------------------------------

/// Service UUID both the listening and the dialing side bind to
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x351953b1_be93_4240_8519_648cfa5b7553);

/// Human readable service record name registered by the listening side
pub const SERVICE_NAME: &str = "Bluetooth Chat Server";

// ----------------------------------------------------------------------------
// Devices
// ----------------------------------------------------------------------------

/// A remote device as reported by discovery or the bonded-device registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    /// Advertised name, when the device exposes one
    pub name: Option<String>,
    /// Hardware address, unique per device
    pub address: String,
}

impl Device {
    pub fn new(name: Option<String>, address: impl Into<String>) -> Self {
        Self {
            name,
            address: address.into(),
        }
    }

    /// Name for display, falling back to the address
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

// ----------------------------------------------------------------------------
// Messages
// ----------------------------------------------------------------------------

/// A chat message, either typed locally or decoded from the peer's stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub sender_name: String,
    pub originated_locally: bool,
}

impl Message {
    /// Message typed on this device
    pub fn local(sender_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender_name: sender_name.into(),
            originated_locally: true,
        }
    }

    /// Message received from the peer
    pub fn remote(sender_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender_name: sender_name.into(),
            originated_locally: false,
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Events and Status
// ----------------------------------------------------------------------------

/// Items emitted on the event stream of a listen or connect session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A stream to the peer is open
    Established,
    /// A message arrived from the peer
    TransferSucceeded(Message),
    /// The session failed; always the last item of the stream
    Error(String),
}

/// Lifecycle of the controller's single connection slot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    /// Waiting for an inbound stream
    Listening,
    /// Dialing a peer
    Connecting { address: String },
    /// A transfer channel is live
    Connected { address: String },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ConnectionStatus::Idle)
    }

    /// Address of the peer being dialed or connected, if any
    pub fn peer_address(&self) -> Option<&str> {
        match self {
            ConnectionStatus::Connecting { address } | ConnectionStatus::Connected { address } => {
                Some(address)
            }
            _ => None,
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "Idle",
            ConnectionStatus::Listening => "Listening",
            ConnectionStatus::Connecting { .. } => "Connecting",
            ConnectionStatus::Connected { .. } => "Connected",
        }
    }
}

// ----------------------------------------------------------------------------
// Platform Notifications
// ----------------------------------------------------------------------------

/// Link-level connection change observed by the platform stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    pub device: Device,
    pub connected: bool,
}

/// Runtime permissions gating adapter operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Required to discover nearby devices
    Scan,
    /// Required to open, accept, and use connections
    Connect,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Scan => f.write_str("scan"),
            Permission::Connect => f.write_str("connect"),
        }
    }
}
