//! Chat core configuration

use std::time::Duration;

use uuid::Uuid;

use crate::types::{SERVICE_NAME, SERVICE_UUID};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the chat controller and its transfer channels
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Service UUID used by both listen and connect
    pub service_uuid: Uuid,
    /// Service record name registered when listening
    pub service_name: String,
    /// Largest accepted inbound frame payload
    pub max_frame_length: usize,
    /// Capacity of each session's event stream
    pub event_buffer: usize,
    /// Capacity of the error broadcast
    pub error_buffer: usize,
    /// Sender name used when the adapter reports no local name
    pub unknown_sender_name: String,
    /// Give up dialing after this long; `None` waits indefinitely
    pub connect_timeout: Option<Duration>,
    /// Give up waiting for an inbound peer after this long; `None` waits indefinitely
    pub accept_timeout: Option<Duration>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            service_uuid: SERVICE_UUID,
            service_name: SERVICE_NAME.to_string(),
            max_frame_length: 1024 * 1024,
            event_buffer: 64,
            error_buffer: 16,
            unknown_sender_name: "Unknown name".to_string(),
            connect_timeout: None,
            accept_timeout: None,
        }
    }
}

impl ChatConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service UUID
    pub fn with_service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuid = uuid;
        self
    }

    /// Set the service record name
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the maximum inbound frame length
    pub fn with_max_frame_length(mut self, length: usize) -> Self {
        self.max_frame_length = length;
        self
    }

    /// Set the per-session event buffer
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Set the placeholder sender name
    pub fn with_unknown_sender_name(mut self, name: impl Into<String>) -> Self {
        self.unknown_sender_name = name.into();
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the accept timeout
    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = Some(timeout);
        self
    }

    /// Check values that would make sessions unusable
    pub fn validate(&self) -> Result<(), String> {
        if self.max_frame_length == 0 {
            return Err("max_frame_length must be greater than zero".to_string());
        }
        if self.max_frame_length > u32::MAX as usize {
            return Err("max_frame_length must fit in a 4-byte length prefix".to_string());
        }
        if self.event_buffer == 0 || self.error_buffer == 0 {
            return Err("event and error buffers must be greater than zero".to_string());
        }
        Ok(())
    }
}
