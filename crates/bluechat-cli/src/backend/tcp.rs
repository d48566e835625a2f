//! TCP link backend
//!
//! Stands in for the radio when no Bluetooth hardware is around: addresses are
//! `host:port`, the configured peers are both "paired" and "discoverable", and
//! the listener is a plain `TcpListener` on the configured address. The service
//! UUID has no meaning here and is only logged.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use bluechat_core::adapter::broadcast_stream;
use bluechat_core::{BluetoothAdapter, BoxedStream, ChatError, Device, LinkEvent, Listener};

use crate::config::TcpConfig;

type CoreResult<T> = bluechat_core::Result<T>;

pub struct TcpAdapter {
    listen_address: String,
    peers: Vec<Device>,
    local_name: Option<String>,
    discovered: broadcast::Sender<Device>,
}

impl TcpAdapter {
    pub fn new(config: &TcpConfig, local_name: Option<String>) -> Self {
        let (discovered, _) = broadcast::channel(64);
        Self {
            listen_address: config.listen_address.clone(),
            peers: config.peers.iter().map(|peer| peer.device()).collect(),
            local_name,
            discovered,
        }
    }
}

#[async_trait]
impl BluetoothAdapter for TcpAdapter {
    async fn start_discovery(&self) -> CoreResult<()> {
        for peer in &self.peers {
            let _ = self.discovered.send(peer.clone());
        }
        Ok(())
    }

    async fn stop_discovery(&self) -> CoreResult<()> {
        Ok(())
    }

    fn discovered_devices(&self) -> BoxStream<'static, Device> {
        broadcast_stream(self.discovered.subscribe())
    }

    fn link_events(&self) -> BoxStream<'static, LinkEvent> {
        // TCP has no link layer beneath the stream
        stream::pending().boxed()
    }

    async fn bonded_devices(&self) -> CoreResult<Vec<Device>> {
        Ok(self.peers.clone())
    }

    async fn open_listener(
        &self,
        service_name: &str,
        service_uuid: Uuid,
    ) -> CoreResult<Box<dyn Listener>> {
        let listener = TcpListener::bind(&self.listen_address).await?;
        info!(
            "Listening for '{}' ({}) on {}",
            service_name,
            service_uuid,
            listener.local_addr()?
        );
        Ok(Box::new(TcpChatListener { listener }))
    }

    async fn open_outbound_stream(&self, address: &str, _service_uuid: Uuid) -> CoreResult<BoxedStream> {
        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;
        debug!("TCP connection to {} established", address);
        Ok(Box::new(stream))
    }

    async fn local_device_name(&self) -> Option<String> {
        self.local_name.clone()
    }
}

struct TcpChatListener {
    listener: TcpListener,
}

#[async_trait]
impl Listener for TcpChatListener {
    async fn accept(&mut self) -> CoreResult<(BoxedStream, String)> {
        let (stream, peer) = self.listener.accept().await.map_err(ChatError::Io)?;
        stream.set_nodelay(true)?;
        Ok((Box::new(stream), peer.to_string()))
    }
}
