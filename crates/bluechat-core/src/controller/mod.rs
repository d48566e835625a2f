//! Connection orchestration
//!
//! [`ChatController`] owns the discovery state and the single connection
//! slot. `listen()` and `connect()` return cold [`EventStream`]s: nothing is
//! opened until the stream is first polled, and dropping the stream (or
//! calling [`ChatController::close_connection`]) cancels the session and runs
//! its teardown.
//!
//! Published state is held in `watch` channels so readers always see a whole
//! snapshot. "Connected" is derived from [`ConnectionStatus`], which only the
//! session task writes.

mod session;
mod state;

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::adapter::BluetoothAdapter;
use crate::config::ChatConfig;
use crate::errors::{ChatError, Result};
use crate::types::{ConnectionEvent, ConnectionStatus, Device, LinkEvent, Message, Permission};

use session::{run_session, Role};
use state::SharedState;

// ----------------------------------------------------------------------------
// Event Stream
// ----------------------------------------------------------------------------

/// Events of one listen or connect session
///
/// The session starts on first poll. Dropping the stream cancels it.
pub struct EventStream {
    inner: BoxStream<'static, ConnectionEvent>,
    _cancel_on_drop: DropGuard,
}

impl Stream for EventStream {
    type Item = ConnectionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

// ----------------------------------------------------------------------------
// Controller
// ----------------------------------------------------------------------------

struct SessionHandle {
    id: u64,
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub(crate) struct Inner {
    pub(crate) adapter: Arc<dyn BluetoothAdapter>,
    pub(crate) config: ChatConfig,
    pub(crate) state: SharedState,
    session: Mutex<Option<SessionHandle>>,
    next_session_id: AtomicU64,
    lifecycle: CancellationToken,
    subscriptions: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Drives discovery and the single point-to-point connection
#[derive(Clone)]
pub struct ChatController {
    inner: Arc<Inner>,
}

impl ChatController {
    /// Create a controller and subscribe to the adapter's discovery and link events
    pub async fn start(adapter: Arc<dyn BluetoothAdapter>, config: ChatConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|reason| ChatError::InvalidConfiguration { reason })?;

        let inner = Arc::new(Inner {
            state: SharedState::new(config.error_buffer),
            adapter,
            config,
            session: Mutex::new(None),
            next_session_id: AtomicU64::new(1),
            lifecycle: CancellationToken::new(),
            subscriptions: std::sync::Mutex::new(Vec::new()),
        });

        let discovered = inner.adapter.discovered_devices();
        let links = inner.adapter.link_events();
        let handles = vec![
            tokio::spawn(watch_discovery(
                Arc::downgrade(&inner),
                discovered,
                inner.lifecycle.clone(),
            )),
            tokio::spawn(watch_links(
                Arc::downgrade(&inner),
                links,
                inner.lifecycle.clone(),
            )),
        ];
        inner
            .subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(handles);

        let controller = Self { inner };
        match controller.refresh_paired_devices().await {
            Ok(_) | Err(ChatError::PermissionDenied { .. }) => {}
            Err(e) => warn!("Failed to load bonded devices: {}", e),
        }

        info!("Chat controller started");
        Ok(controller)
    }

    fn require(&self, permission: Permission) -> Result<()> {
        if self.inner.adapter.has_permission(permission) {
            Ok(())
        } else {
            Err(ChatError::PermissionDenied { permission })
        }
    }

    // ------------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------------

    /// Refresh the paired list and start discovering nearby devices
    pub async fn start_discovery(&self) -> Result<()> {
        self.require(Permission::Scan)?;
        match self.refresh_paired_devices().await {
            Ok(_) | Err(ChatError::PermissionDenied { .. }) => {}
            Err(e) => warn!("Failed to refresh bonded devices: {}", e),
        }
        self.inner.adapter.start_discovery().await?;
        info!("Discovery started");
        Ok(())
    }

    /// Stop discovering
    pub async fn stop_discovery(&self) -> Result<()> {
        self.require(Permission::Scan)?;
        self.inner.adapter.stop_discovery().await?;
        info!("Discovery stopped");
        Ok(())
    }

    /// Reload the bonded-device list and publish it
    pub async fn refresh_paired_devices(&self) -> Result<Vec<Device>> {
        self.require(Permission::Connect)?;
        let bonded = self.inner.adapter.bonded_devices().await?;
        debug!("{} bonded devices", bonded.len());
        self.inner.state.paired.send_replace(bonded.clone());
        Ok(bonded)
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Listen for one inbound connection on the service UUID
    pub fn listen(&self) -> Result<EventStream> {
        self.require(Permission::Connect)?;
        Ok(self.session_stream(Role::Server))
    }

    /// Connect to `device` on the service UUID
    pub fn connect(&self, device: Device) -> Result<EventStream> {
        self.require(Permission::Connect)?;
        Ok(self.session_stream(Role::Client(device)))
    }

    fn session_stream(&self, role: Role) -> EventStream {
        let inner = self.inner.clone();
        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();
        let (events_tx, events_rx) = mpsc::channel(inner.config.event_buffer);

        let start = async move {
            let mut slot = inner.session.lock().await;
            if let Some(previous) = slot.take() {
                debug!("Tearing down session {} before starting a new one", previous.id);
                previous.token.cancel();
                if let Err(e) = previous.task.await {
                    warn!("Session {} task failed: {}", previous.id, e);
                }
            }

            let id = inner.next_session_id.fetch_add(1, Ordering::Relaxed);
            let task = tokio::spawn(run_session(
                inner.clone(),
                id,
                role,
                token.clone(),
                events_tx,
            ));
            *slot = Some(SessionHandle { id, token, task });
            stream::unfold(events_rx, |mut events| async move {
                events.recv().await.map(|event| (event, events))
            })
        };

        EventStream {
            inner: stream::once(start).flatten().boxed(),
            _cancel_on_drop: guard,
        }
    }

    /// Send `text` to the connected peer
    ///
    /// Returns the message as it was transmitted.
    pub async fn try_send(&self, text: impl Into<String>) -> Result<Message> {
        self.require(Permission::Connect)?;
        let channel = self
            .inner
            .state
            .current_channel()
            .ok_or(ChatError::NotConnected)?;

        let sender_name = match self.inner.adapter.local_device_name().await {
            Some(name) => name,
            None => self.inner.config.unknown_sender_name.clone(),
        };
        let message = Message::local(sender_name, text);
        if let Err(e) = channel.send_message(&message).await {
            if e.is_io() {
                warn!("Write to {} failed: {}", channel.peer(), e);
            }
            return Err(e);
        }
        debug!("Sent message to {}", channel.peer());
        Ok(message)
    }

    /// Cancel the live session, if any, and wait for its teardown
    pub async fn close_connection(&self) {
        let handle = self.inner.session.lock().await.take();
        if let Some(handle) = handle {
            handle.token.cancel();
            if let Err(e) = handle.task.await {
                warn!("Session {} task failed: {}", handle.id, e);
            }
            debug!("Session {} closed", handle.id);
        }
    }

    /// Stop subscriptions and discovery and close any connection
    pub async fn shutdown(&self) {
        if self.inner.lifecycle.is_cancelled() {
            return;
        }
        self.inner.lifecycle.cancel();

        let subscriptions: Vec<JoinHandle<()>> = self
            .inner
            .subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for handle in subscriptions {
            let _ = handle.await;
        }

        if self.inner.adapter.has_permission(Permission::Scan) {
            if let Err(e) = self.inner.adapter.stop_discovery().await {
                debug!("Failed to stop discovery during shutdown: {}", e);
            }
        }
        self.close_connection().await;
        info!("Chat controller shut down");
    }

    // ------------------------------------------------------------------------
    // Published State
    // ------------------------------------------------------------------------

    /// Bonded devices, as of the last refresh
    pub fn paired_devices(&self) -> watch::Receiver<Vec<Device>> {
        self.inner.state.paired.subscribe()
    }

    /// Devices found by discovery, deduplicated, in discovery order
    pub fn scanned_devices(&self) -> watch::Receiver<Vec<Device>> {
        self.inner.state.scanned.subscribe()
    }

    /// Lifecycle of the connection slot
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.state.status.subscribe()
    }

    /// Whether a transfer channel is live
    pub fn is_connected(&self) -> bool {
        self.inner.state.status.borrow().is_connected()
    }

    /// Most recent error description
    pub fn last_error(&self) -> watch::Receiver<Option<String>> {
        self.inner.state.last_error.subscribe()
    }

    /// Every error published from now on
    pub fn errors(&self) -> broadcast::Receiver<String> {
        self.inner.state.errors.subscribe()
    }

    pub fn config(&self) -> &ChatConfig {
        &self.inner.config
    }
}

// ----------------------------------------------------------------------------
// Adapter Subscriptions
// ----------------------------------------------------------------------------

async fn watch_discovery(
    inner: Weak<Inner>,
    mut devices: BoxStream<'static, Device>,
    lifecycle: CancellationToken,
) {
    loop {
        let device = tokio::select! {
            _ = lifecycle.cancelled() => break,
            device = devices.next() => match device {
                Some(device) => device,
                None => break,
            },
        };
        let Some(inner) = inner.upgrade() else { break };
        inner.state.scanned.send_if_modified(|scanned| {
            if scanned.contains(&device) {
                false
            } else {
                debug!("Discovered {}", device);
                scanned.push(device);
                true
            }
        });
    }
    debug!("Discovery subscription ended");
}

async fn watch_links(
    inner: Weak<Inner>,
    mut links: BoxStream<'static, LinkEvent>,
    lifecycle: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = lifecycle.cancelled() => break,
            event = links.next() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(inner) = inner.upgrade() else { break };
        handle_link_event(&inner, event).await;
    }
    debug!("Link subscription ended");
}

async fn handle_link_event(inner: &Inner, event: LinkEvent) {
    if !inner.adapter.has_permission(Permission::Connect) {
        debug!("Ignoring link event without connect permission");
        return;
    }

    let bonded = match inner.adapter.bonded_devices().await {
        Ok(bonded) => bonded,
        Err(e) => {
            warn!("Failed to read bonded devices: {}", e);
            return;
        }
    };
    if !bonded.iter().any(|d| d.address == event.device.address) {
        inner.state.publish_error(&ChatError::NotPaired {
            address: event.device.address,
        });
        return;
    }

    if event.connected {
        debug!("Link up: {}", event.device);
    } else if inner.state.signal_link_lost(&event.device.address) {
        info!("Link to {} lost", event.device);
    }
}
