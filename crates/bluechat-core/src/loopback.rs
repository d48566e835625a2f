//! In-process loopback adapter
//!
//! A [`LoopbackRadio`] is a shared "airspace": every [`LoopbackAdapter`]
//! created from it can discover the others, listen on a service UUID, and
//! dial another adapter's listener. Streams are `tokio::io::duplex` pipes.
//! Used by the test suite and for demos without Bluetooth hardware.

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use crate::adapter::{broadcast_stream, BluetoothAdapter, BoxedStream, Listener};
use crate::errors::{ChatError, Result};
use crate::types::{Device, LinkEvent, Permission};

const PIPE_CAPACITY: usize = 64 * 1024;
const BROADCAST_CAPACITY: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ----------------------------------------------------------------------------
// Radio
// ----------------------------------------------------------------------------

type ListenerKey = (String, Uuid);

/// A dial waiting in a listener's queue; `accepted` fires once it is taken
struct PendingDial {
    stream: BoxedStream,
    address: String,
    accepted: oneshot::Sender<()>,
}

struct RegisteredListener {
    id: u64,
    incoming: mpsc::Sender<PendingDial>,
    counters: Arc<StreamCounters>,
}

#[derive(Default)]
struct RadioState {
    devices: Vec<Device>,
    listeners: HashMap<ListenerKey, RegisteredListener>,
    next_listener_id: u64,
}

/// Shared medium connecting loopback adapters
#[derive(Clone, Default)]
pub struct LoopbackRadio {
    state: Arc<Mutex<RadioState>>,
}

impl LoopbackRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an adapter with the given address and advertised name
    pub fn adapter(&self, address: &str, name: Option<&str>) -> LoopbackAdapter {
        let device = Device::new(name.map(str::to_string), address);
        lock(&self.state).devices.push(device.clone());

        let (discovered_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (link_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        LoopbackAdapter {
            radio: self.clone(),
            device,
            bonded: Arc::new(Mutex::new(Vec::new())),
            denied: Arc::new(Mutex::new(HashSet::new())),
            discovering: Arc::new(AtomicBool::new(false)),
            discovered_tx,
            link_tx,
            stats: Arc::new(StreamCounters::default()),
        }
    }

    /// Drop every listener registered by `address`; pending accepts fail
    pub fn power_off(&self, address: &str) {
        lock(&self.state)
            .listeners
            .retain(|(listener_address, _), _| listener_address != address);
    }

    /// Whether `address` currently has a listener on `service_uuid`
    pub fn is_listening(&self, address: &str, service_uuid: Uuid) -> bool {
        lock(&self.state)
            .listeners
            .contains_key(&(address.to_string(), service_uuid))
    }
}

// ----------------------------------------------------------------------------
// Stream Accounting
// ----------------------------------------------------------------------------

#[derive(Default)]
struct StreamCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Number of streams an adapter handed out and how many have been closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub opened: usize,
    pub closed: usize,
}

impl StreamStats {
    pub fn open(&self) -> usize {
        self.opened - self.closed
    }
}

/// Duplex pipe end that reports its close to the owning adapter
struct TrackedStream {
    inner: DuplexStream,
    counters: Arc<StreamCounters>,
}

impl TrackedStream {
    fn new(inner: DuplexStream, counters: Arc<StreamCounters>) -> Self {
        counters.opened.fetch_add(1, Ordering::SeqCst);
        Self { inner, counters }
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TrackedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

// ----------------------------------------------------------------------------
// Adapter
// ----------------------------------------------------------------------------

/// One simulated local Bluetooth adapter
#[derive(Clone)]
pub struct LoopbackAdapter {
    radio: LoopbackRadio,
    device: Device,
    bonded: Arc<Mutex<Vec<Device>>>,
    denied: Arc<Mutex<HashSet<Permission>>>,
    discovering: Arc<AtomicBool>,
    discovered_tx: broadcast::Sender<Device>,
    link_tx: broadcast::Sender<LinkEvent>,
    stats: Arc<StreamCounters>,
}

impl LoopbackAdapter {
    /// This adapter as seen by its peers
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Add a device to the bonded registry
    pub fn bond(&self, device: Device) {
        let mut bonded = lock(&self.bonded);
        if !bonded.contains(&device) {
            bonded.push(device);
        }
    }

    /// Grant or revoke a runtime permission
    pub fn set_permission(&self, permission: Permission, granted: bool) {
        let mut denied = lock(&self.denied);
        if granted {
            denied.remove(&permission);
        } else {
            denied.insert(permission);
        }
    }

    pub fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }

    /// Report a discovered device; dropped unless discovery is running
    pub fn inject_discovered(&self, device: Device) {
        if self.is_discovering() {
            let _ = self.discovered_tx.send(device);
        }
    }

    /// Report a link-level connection change
    pub fn inject_link_event(&self, device: Device, connected: bool) {
        let _ = self.link_tx.send(LinkEvent { device, connected });
    }

    /// Streams handed out by this adapter so far
    pub fn stream_stats(&self) -> StreamStats {
        StreamStats {
            opened: self.stats.opened.load(Ordering::SeqCst),
            closed: self.stats.closed.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl BluetoothAdapter for LoopbackAdapter {
    fn has_permission(&self, permission: Permission) -> bool {
        !lock(&self.denied).contains(&permission)
    }

    async fn start_discovery(&self) -> Result<()> {
        self.discovering.store(true, Ordering::SeqCst);
        let others: Vec<Device> = lock(&self.radio.state)
            .devices
            .iter()
            .filter(|d| d.address != self.device.address)
            .cloned()
            .collect();
        for device in others {
            let _ = self.discovered_tx.send(device);
        }
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<()> {
        self.discovering.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn discovered_devices(&self) -> BoxStream<'static, Device> {
        broadcast_stream(self.discovered_tx.subscribe())
    }

    fn link_events(&self) -> BoxStream<'static, LinkEvent> {
        broadcast_stream(self.link_tx.subscribe())
    }

    async fn bonded_devices(&self) -> Result<Vec<Device>> {
        Ok(lock(&self.bonded).clone())
    }

    async fn open_listener(
        &self,
        service_name: &str,
        service_uuid: Uuid,
    ) -> Result<Box<dyn Listener>> {
        let key = (self.device.address.clone(), service_uuid);
        let (tx, rx) = mpsc::channel(1);
        let id = {
            let mut state = lock(&self.radio.state);
            if state.listeners.contains_key(&key) {
                return Err(ChatError::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    "service already registered",
                )));
            }
            state.next_listener_id += 1;
            let id = state.next_listener_id;
            state.listeners.insert(
                key.clone(),
                RegisteredListener {
                    id,
                    incoming: tx,
                    counters: self.stats.clone(),
                },
            );
            id
        };
        debug!(
            "Loopback listener '{}' registered on {}",
            service_name, self.device.address
        );
        Ok(Box::new(LoopbackListener {
            radio: self.radio.clone(),
            key,
            id,
            incoming: rx,
        }))
    }

    async fn open_outbound_stream(&self, address: &str, service_uuid: Uuid) -> Result<BoxedStream> {
        let target = lock(&self.radio.state)
            .listeners
            .get(&(address.to_string(), service_uuid))
            .map(|listener| (listener.incoming.clone(), listener.counters.clone()));
        let refused = || {
            ChatError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("no service {} on {}", service_uuid, address),
            ))
        };
        let (sender, listener_counters) = target.ok_or_else(refused)?;

        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        let (accepted, acknowledged) = oneshot::channel();
        let dial = PendingDial {
            stream: Box::new(TrackedStream::new(remote, listener_counters)),
            address: self.device.address.clone(),
            accepted,
        };
        sender.send(dial).await.map_err(|_| refused())?;
        // A listener dropped with this dial still queued refuses it
        acknowledged.await.map_err(|_| refused())?;
        Ok(Box::new(TrackedStream::new(local, self.stats.clone())))
    }

    async fn local_device_name(&self) -> Option<String> {
        self.device.name.clone()
    }
}

// ----------------------------------------------------------------------------
// Listener
// ----------------------------------------------------------------------------

struct LoopbackListener {
    radio: LoopbackRadio,
    key: ListenerKey,
    id: u64,
    incoming: mpsc::Receiver<PendingDial>,
}

#[async_trait]
impl Listener for LoopbackListener {
    async fn accept(&mut self) -> Result<(BoxedStream, String)> {
        loop {
            let dial = self.incoming.recv().await.ok_or_else(|| {
                ChatError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "listener closed",
                ))
            })?;
            // Skip dialers that gave up while queued
            if dial.accepted.send(()).is_ok() {
                return Ok((dial.stream, dial.address));
            }
        }
    }
}

impl Drop for LoopbackListener {
    fn drop(&mut self) {
        let mut state = lock(&self.radio.state);
        if matches!(state.listeners.get(&self.key), Some(listener) if listener.id == self.id) {
            state.listeners.remove(&self.key);
        }
    }
}
