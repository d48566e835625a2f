//! Platform collaborator interface
//!
//! The controller never touches the Bluetooth stack directly. Everything it
//! needs from the platform (permissions, discovery, the bonded-device
//! registry, listening and dialing on a service UUID) goes through
//! [`BluetoothAdapter`]. Implementations live outside the core: see
//! [`crate::loopback`] for an in-process one.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::errors::Result;
use crate::types::{Device, LinkEvent, Permission};

// ----------------------------------------------------------------------------
// Stream Handles
// ----------------------------------------------------------------------------

/// A full-duplex byte stream to one peer
///
/// Dropping the stream closes it.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Owned, type-erased stream handle
pub type BoxedStream = Box<dyn ByteStream>;

/// A listening socket bound to a service record
///
/// Dropping the listener closes it and unregisters the record.
#[async_trait]
pub trait Listener: Send {
    /// Wait for the next inbound stream; returns it with the remote address
    async fn accept(&mut self) -> Result<(BoxedStream, String)>;
}

// ----------------------------------------------------------------------------
// Adapter Trait
// ----------------------------------------------------------------------------

/// Access to the local Bluetooth stack
#[async_trait]
pub trait BluetoothAdapter: Send + Sync + 'static {
    /// Whether the given runtime permission is currently granted
    fn has_permission(&self, _permission: Permission) -> bool {
        true
    }

    /// Begin broadcasting discovery; results arrive on [`Self::discovered_devices`]
    async fn start_discovery(&self) -> Result<()>;

    /// Cancel an ongoing discovery; a no-op when none is running
    async fn stop_discovery(&self) -> Result<()>;

    /// Subscribe to devices found by discovery
    fn discovered_devices(&self) -> BoxStream<'static, Device>;

    /// Subscribe to link-level connect/disconnect notifications
    fn link_events(&self) -> BoxStream<'static, LinkEvent>;

    /// Devices currently bonded with this adapter
    async fn bonded_devices(&self) -> Result<Vec<Device>>;

    /// Register a service record and start listening on it
    async fn open_listener(&self, service_name: &str, service_uuid: Uuid)
        -> Result<Box<dyn Listener>>;

    /// Dial the service on a remote device
    async fn open_outbound_stream(&self, address: &str, service_uuid: Uuid)
        -> Result<BoxedStream>;

    /// Name this adapter advertises to peers
    async fn local_device_name(&self) -> Option<String>;
}

/// Turn a broadcast subscription into a notification stream
///
/// Lagged receivers skip what they missed; the stream ends when every sender
/// is gone.
pub fn broadcast_stream<T>(receiver: broadcast::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + 'static,
{
    stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(item) => return Some((item, receiver)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
