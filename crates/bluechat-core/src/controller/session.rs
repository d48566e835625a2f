//! Listen and connect session tasks
//!
//! A session owns its listener and stream handles as locals, so every exit
//! path drops them exactly once. [`SessionGuard`] resets the published state
//! even if the task is aborted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::ActiveChannel;
use super::Inner;
use crate::adapter::BoxedStream;
use crate::channel::TransferChannel;
use crate::errors::{ChatError, Result};
use crate::types::{ConnectionEvent, ConnectionStatus, Device, Permission};

pub(crate) enum Role {
    Server,
    Client(Device),
}

enum SessionEnd {
    /// Consumer dropped the stream or the connection was closed locally
    Cancelled,
    Failed(ChatError),
}

impl From<ChatError> for SessionEnd {
    fn from(err: ChatError) -> Self {
        SessionEnd::Failed(err)
    }
}

// ----------------------------------------------------------------------------
// Teardown
// ----------------------------------------------------------------------------

struct SessionGuard {
    inner: Arc<Inner>,
    id: u64,
}

impl SessionGuard {
    /// Close the transfer channel gracefully; the rest happens on drop
    async fn finish(self) {
        if let Some(active) = self.inner.state.take_channel(self.id) {
            active.channel.close().await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.inner.state.take_channel(self.id);
        self.inner.state.status.send_replace(ConnectionStatus::Idle);
        debug!("Session {} torn down", self.id);
    }
}

// ----------------------------------------------------------------------------
// Session Task
// ----------------------------------------------------------------------------

pub(crate) async fn run_session(
    inner: Arc<Inner>,
    id: u64,
    role: Role,
    token: CancellationToken,
    events: mpsc::Sender<ConnectionEvent>,
) {
    let guard = SessionGuard {
        inner: inner.clone(),
        id,
    };

    let outcome = match role {
        Role::Server => serve(&inner, id, &token, &events).await,
        Role::Client(device) => dial(&inner, id, device, &token, &events).await,
    };
    guard.finish().await;

    match outcome {
        Ok(()) => info!("Session {} ended", id),
        Err(SessionEnd::Cancelled) => debug!("Session {} cancelled", id),
        Err(SessionEnd::Failed(e)) => {
            inner.state.publish_error(&e);
            emit(&events, &token, ConnectionEvent::Error(e.to_string())).await;
        }
    }
}

async fn serve(
    inner: &Inner,
    id: u64,
    token: &CancellationToken,
    events: &mpsc::Sender<ConnectionEvent>,
) -> std::result::Result<(), SessionEnd> {
    let config = &inner.config;
    inner.state.status.send_replace(ConnectionStatus::Listening);
    info!("Session {}: listening on {}", id, config.service_uuid);

    let mut listener = cancellable(
        token,
        inner
            .adapter
            .open_listener(&config.service_name, config.service_uuid),
    )
    .await?;

    let (stream, address) = cancellable(
        token,
        with_timeout(config.accept_timeout, "accept", listener.accept()),
    )
    .await?;
    // One inbound connection per listen(); later peers are refused.
    drop(listener);
    info!("Session {}: accepted connection from {}", id, address);

    relay(inner, id, stream, address, token, events).await
}

async fn dial(
    inner: &Inner,
    id: u64,
    device: Device,
    token: &CancellationToken,
    events: &mpsc::Sender<ConnectionEvent>,
) -> std::result::Result<(), SessionEnd> {
    let config = &inner.config;
    inner.state.status.send_replace(ConnectionStatus::Connecting {
        address: device.address.clone(),
    });

    if inner.adapter.has_permission(Permission::Scan) {
        if let Err(e) = inner.adapter.stop_discovery().await {
            debug!("Failed to stop discovery before connecting: {}", e);
        }
    }

    info!("Session {}: connecting to {}", id, device);
    let stream = cancellable(
        token,
        with_timeout(
            config.connect_timeout,
            "connect",
            inner
                .adapter
                .open_outbound_stream(&device.address, config.service_uuid),
        ),
    )
    .await?;
    info!("Session {}: connected to {}", id, device);

    relay(inner, id, stream, device.address, token, events).await
}

/// Install a transfer channel and forward its inbound messages
async fn relay(
    inner: &Inner,
    id: u64,
    stream: BoxedStream,
    address: String,
    token: &CancellationToken,
    events: &mpsc::Sender<ConnectionEvent>,
) -> std::result::Result<(), SessionEnd> {
    let channel = Arc::new(TransferChannel::new(
        stream,
        address.clone(),
        inner.config.max_frame_length,
    ));
    let mut incoming = channel.incoming().ok_or(ChatError::ChannelClosed)?;
    let link_lost = Arc::new(Notify::new());
    inner.state.install_channel(ActiveChannel {
        session_id: id,
        channel,
        link_lost: link_lost.clone(),
    });

    if !emit(events, token, ConnectionEvent::Established).await {
        return Err(SessionEnd::Cancelled);
    }

    loop {
        let item = tokio::select! {
            _ = token.cancelled() => return Err(SessionEnd::Cancelled),
            _ = link_lost.notified() => {
                return Err(ChatError::ConnectionLost { address: address.clone() }.into());
            }
            item = incoming.next() => item,
        };

        match item {
            Some(Ok(message)) => {
                debug!("Session {}: message from {}", id, message.sender_name);
                if !emit(events, token, ConnectionEvent::TransferSucceeded(message)).await {
                    return Err(SessionEnd::Cancelled);
                }
            }
            Some(Err(e)) => {
                warn!("Session {}: read from {} failed: {}", id, address, e);
                return Err(e.into());
            }
            None => {
                info!("Session {}: {} closed the connection", id, address);
                return Ok(());
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Deliver an event unless the session is cancelled or the consumer is gone
async fn emit(
    events: &mpsc::Sender<ConnectionEvent>,
    token: &CancellationToken,
    event: ConnectionEvent,
) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        sent = events.send(event) => sent.is_ok(),
    }
}

async fn cancellable<T>(
    token: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> std::result::Result<T, SessionEnd> {
    tokio::select! {
        _ = token.cancelled() => Err(SessionEnd::Cancelled),
        result = operation => result.map_err(SessionEnd::Failed),
    }
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    operation: &'static str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(after) => tokio::time::timeout(after, future)
            .await
            .unwrap_or(Err(ChatError::Timeout { operation, after })),
        None => future.await,
    }
}
