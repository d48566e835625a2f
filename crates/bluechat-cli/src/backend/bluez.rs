//! BlueZ RFCOMM backend using bluer
//!
//! Listening registers an RFCOMM server profile with bluetoothd under the
//! service UUID; BlueZ publishes the SDP record and hands each inbound
//! connection to the profile handle. Dialing registers a client profile and
//! asks BlueZ to connect it to the remote device.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, Role};
use bluer::{AdapterEvent, Address, DeviceEvent, DeviceProperty};
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use bluechat_core::adapter::broadcast_stream;
use bluechat_core::{BluetoothAdapter, BoxedStream, ChatError, Device, LinkEvent, Listener};

use crate::error::{CliError, Result};

type CoreResult<T> = bluechat_core::Result<T>;

// ----------------------------------------------------------------------------
// Adapter
// ----------------------------------------------------------------------------

pub struct BluezAdapter {
    session: bluer::Session,
    adapter: bluer::Adapter,
    local_name: Option<String>,
    discovered: broadcast::Sender<Device>,
    links: broadcast::Sender<LinkEvent>,
    discovery: Mutex<Option<JoinHandle<()>>>,
    monitor: JoinHandle<()>,
}

impl BluezAdapter {
    /// Open the default adapter, powering it on if needed
    pub async fn new(local_name: Option<String>) -> Result<Self> {
        let session = bluer::Session::new()
            .await
            .map_err(|e| CliError::BackendInit(format!("BlueZ session: {}", e)))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| CliError::BackendInit(format!("Bluetooth adapter: {}", e)))?;

        if !adapter.is_powered().await.unwrap_or(false) {
            adapter
                .set_powered(true)
                .await
                .map_err(|e| CliError::BackendInit(format!("Failed to power on adapter: {}", e)))?;
        }

        let local_name = match local_name {
            Some(name) => Some(name),
            None => adapter.alias().await.ok(),
        };

        let (discovered, _) = broadcast::channel(64);
        let (links, _) = broadcast::channel(64);
        let adapter_events = adapter
            .events()
            .await
            .map_err(|e| CliError::BackendInit(format!("Adapter events: {}", e)))?;
        let monitor = tokio::spawn(monitor_links(adapter.clone(), adapter_events, links.clone()));

        info!("Using Bluetooth adapter {}", adapter.name());
        Ok(Self {
            session,
            adapter,
            local_name,
            discovered,
            links,
            discovery: Mutex::new(None),
            monitor,
        })
    }

    fn replace_discovery(&self, task: Option<JoinHandle<()>>) {
        let previous = {
            let mut slot = self
                .discovery
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *slot, task)
        };
        // Dropping the discovery stream ends the BlueZ discovery session
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn register(&self, profile: Profile) -> CoreResult<Pin<Box<ProfileHandle>>> {
        let handle = self
            .session
            .register_profile(profile)
            .await
            .map_err(ChatError::adapter)?;
        Ok(Box::pin(handle))
    }
}

impl Drop for BluezAdapter {
    fn drop(&mut self) {
        self.replace_discovery(None);
        self.monitor.abort();
    }
}

#[async_trait]
impl BluetoothAdapter for BluezAdapter {
    async fn start_discovery(&self) -> CoreResult<()> {
        let events = self
            .adapter
            .discover_devices()
            .await
            .map_err(ChatError::adapter)?;
        let task = tokio::spawn(forward_discoveries(
            self.adapter.clone(),
            events,
            self.discovered.clone(),
        ));
        self.replace_discovery(Some(task));
        Ok(())
    }

    async fn stop_discovery(&self) -> CoreResult<()> {
        self.replace_discovery(None);
        Ok(())
    }

    fn discovered_devices(&self) -> BoxStream<'static, Device> {
        broadcast_stream(self.discovered.subscribe())
    }

    fn link_events(&self) -> BoxStream<'static, LinkEvent> {
        broadcast_stream(self.links.subscribe())
    }

    async fn bonded_devices(&self) -> CoreResult<Vec<Device>> {
        let mut bonded = Vec::new();
        for address in self
            .adapter
            .device_addresses()
            .await
            .map_err(ChatError::adapter)?
        {
            let device = self.adapter.device(address).map_err(ChatError::adapter)?;
            if device.is_paired().await.map_err(ChatError::adapter)? {
                let name = device.name().await.ok().flatten();
                bonded.push(Device::new(name, address.to_string()));
            }
        }
        Ok(bonded)
    }

    async fn open_listener(
        &self,
        service_name: &str,
        service_uuid: Uuid,
    ) -> CoreResult<Box<dyn Listener>> {
        let handle = self
            .register(Profile {
                uuid: service_uuid,
                name: Some(service_name.to_string()),
                role: Some(Role::Server),
                require_authentication: Some(false),
                require_authorization: Some(false),
                ..Default::default()
            })
            .await?;
        info!("RFCOMM profile '{}' registered for {}", service_name, service_uuid);
        Ok(Box::new(RfcommListener { handle }))
    }

    async fn open_outbound_stream(&self, address: &str, service_uuid: Uuid) -> CoreResult<BoxedStream> {
        let address: Address = address
            .parse()
            .map_err(|e| ChatError::adapter(format!("Invalid address {}: {}", address, e)))?;
        let device = self.adapter.device(address).map_err(ChatError::adapter)?;
        let mut handle = self
            .register(Profile {
                uuid: service_uuid,
                role: Some(Role::Client),
                require_authentication: Some(false),
                require_authorization: Some(false),
                auto_connect: Some(false),
                ..Default::default()
            })
            .await?;

        // BlueZ delivers the connection to the profile handle, possibly before
        // the ConnectProfile call itself returns. The call is aborted on every
        // exit, including cancellation of this future.
        let mut connecting = AbortOnDrop(tokio::spawn(async move {
            device.connect_profile(&service_uuid).await
        }));
        let request = tokio::select! {
            request = handle.next() => request,
            joined = &mut connecting.0 => match joined {
                Ok(Ok(())) => handle.next().await,
                Ok(Err(e)) => return Err(ChatError::adapter(e)),
                Err(e) => return Err(ChatError::adapter(e)),
            },
        };
        let request = request.ok_or_else(|| ChatError::adapter("RFCOMM profile unregistered"))?;
        let stream = request.accept()?;
        debug!("RFCOMM stream to {} established", address);
        Ok(Box::new(stream))
    }

    async fn local_device_name(&self) -> Option<String> {
        self.local_name.clone()
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ----------------------------------------------------------------------------
// Listener
// ----------------------------------------------------------------------------

/// Accepts connections delivered to a registered server profile
///
/// Dropping it unregisters the profile, so BlueZ refuses later peers.
struct RfcommListener {
    handle: Pin<Box<ProfileHandle>>,
}

#[async_trait]
impl Listener for RfcommListener {
    async fn accept(&mut self) -> CoreResult<(BoxedStream, String)> {
        let request = self
            .handle
            .next()
            .await
            .ok_or_else(|| ChatError::adapter("RFCOMM profile unregistered"))?;
        let address = request.device().to_string();
        let stream = request.accept()?;
        Ok((Box::new(stream), address))
    }
}

// ----------------------------------------------------------------------------
// Background Tasks
// ----------------------------------------------------------------------------

async fn forward_discoveries(
    adapter: bluer::Adapter,
    events: impl Stream<Item = AdapterEvent> + Send + 'static,
    discovered: broadcast::Sender<Device>,
) {
    let mut events = Box::pin(events);
    while let Some(event) = events.next().await {
        if let AdapterEvent::DeviceAdded(address) = event {
            let name = match adapter.device(address) {
                Ok(device) => device.name().await.ok().flatten(),
                Err(_) => None,
            };
            let _ = discovered.send(Device::new(name, address.to_string()));
        }
    }
    debug!("Discovery stream ended");
}

/// Watch every known device for connection property changes
async fn monitor_links(
    adapter: bluer::Adapter,
    events: impl Stream<Item = AdapterEvent> + Send + 'static,
    links: broadcast::Sender<LinkEvent>,
) {
    let mut watched = HashSet::new();
    let mut watchers = JoinSet::new();

    match adapter.device_addresses().await {
        Ok(addresses) => {
            for address in addresses {
                if watched.insert(address) {
                    watch_device(&adapter, address, &links, &mut watchers);
                }
            }
        }
        Err(e) => warn!("Failed to list known devices: {}", e),
    }

    let mut events = Box::pin(events);
    while let Some(event) = events.next().await {
        if let AdapterEvent::DeviceAdded(address) = event {
            if watched.insert(address) {
                watch_device(&adapter, address, &links, &mut watchers);
            }
        }
    }
}

fn watch_device(
    adapter: &bluer::Adapter,
    address: Address,
    links: &broadcast::Sender<LinkEvent>,
    watchers: &mut JoinSet<()>,
) {
    let device = match adapter.device(address) {
        Ok(device) => device,
        Err(e) => {
            debug!("Cannot watch {}: {}", address, e);
            return;
        }
    };
    let links = links.clone();
    watchers.spawn(async move {
        let events = match device.events().await {
            Ok(events) => events,
            Err(e) => {
                debug!("No events for {}: {}", address, e);
                return;
            }
        };
        let mut events = Box::pin(events);
        while let Some(event) = events.next().await {
            if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(connected)) = event {
                let name = device.name().await.ok().flatten();
                let _ = links.send(LinkEvent {
                    device: Device::new(name, address.to_string()),
                    connected,
                });
            }
        }
    });
}
