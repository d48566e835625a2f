//! BlueChat Core
//!
//! Connection lifecycle and message transfer for point-to-point chat over a
//! Bluetooth stream socket. One side listens on a well-known service UUID, the
//! other dials it; once a stream is up, both exchange length-prefixed text
//! frames.
//!
//! ## Architecture
//!
//! - [`codec`] - `(sender, text)` payload encoding
//! - [`channel`] - length-prefixed framing over one duplex stream
//! - [`controller`] - discovery bookkeeping, listen/connect sessions, teardown
//! - [`adapter`] - the platform collaborator the controller drives
//! - [`loopback`] - an in-process adapter for tests and demos
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bluechat_core::{ChatConfig, ChatController, ConnectionEvent, Device};
//! use bluechat_core::loopback::LoopbackRadio;
//! use futures::StreamExt;
//!
//! # async fn example() -> bluechat_core::Result<()> {
//! let radio = LoopbackRadio::new();
//! let adapter = Arc::new(radio.adapter("AA:BB:CC:DD:EE:FF", Some("Alice")));
//! let controller = ChatController::start(adapter, ChatConfig::default()).await?;
//!
//! let peer = Device::new(Some("Bob".to_string()), "11:22:33:44:55:66");
//! let mut events = controller.connect(peer)?;
//! while let Some(event) = events.next().await {
//!     if let ConnectionEvent::Established = event {
//!         controller.try_send("hello").await?;
//!     }
//! }
//! controller.shutdown().await;
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod adapter;
pub mod channel;
pub mod codec;
pub mod config;
pub mod controller;
pub mod errors;
pub mod loopback;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use adapter::{BluetoothAdapter, BoxedStream, ByteStream, Listener};
pub use channel::{IncomingMessages, TransferChannel};
pub use config::ChatConfig;
pub use controller::{ChatController, EventStream};
pub use errors::{ChatError, Result};
pub use types::{
    ConnectionEvent, ConnectionStatus, Device, LinkEvent, Message, Permission,
    SERVICE_NAME, SERVICE_UUID,
};
