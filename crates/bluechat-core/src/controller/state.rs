//! State published by the controller

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, watch, Notify};
use tracing::warn;

use crate::channel::TransferChannel;
use crate::errors::ChatError;
use crate::types::{ConnectionStatus, Device};

/// The transfer channel of the live session
pub(crate) struct ActiveChannel {
    pub(crate) session_id: u64,
    pub(crate) channel: Arc<TransferChannel>,
    pub(crate) link_lost: Arc<Notify>,
}

pub(crate) struct SharedState {
    pub(crate) paired: watch::Sender<Vec<Device>>,
    pub(crate) scanned: watch::Sender<Vec<Device>>,
    pub(crate) status: watch::Sender<ConnectionStatus>,
    pub(crate) last_error: watch::Sender<Option<String>>,
    pub(crate) errors: broadcast::Sender<String>,
    active: Mutex<Option<ActiveChannel>>,
}

impl SharedState {
    pub(crate) fn new(error_buffer: usize) -> Self {
        Self {
            paired: watch::channel(Vec::new()).0,
            scanned: watch::channel(Vec::new()).0,
            status: watch::channel(ConnectionStatus::Idle).0,
            last_error: watch::channel(None).0,
            errors: broadcast::channel(error_buffer).0,
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveChannel>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn current_channel(&self) -> Option<Arc<TransferChannel>> {
        self.active().as_ref().map(|active| active.channel.clone())
    }

    pub(crate) fn install_channel(&self, active: ActiveChannel) {
        let address = active.channel.peer().to_string();
        *self.active() = Some(active);
        self.status
            .send_replace(ConnectionStatus::Connected { address });
    }

    /// Remove the channel if it still belongs to `session_id`
    pub(crate) fn take_channel(&self, session_id: u64) -> Option<ActiveChannel> {
        let mut active = self.active();
        if matches!(active.as_ref(), Some(a) if a.session_id == session_id) {
            active.take()
        } else {
            None
        }
    }

    /// Wake the session connected to `address`; false when none is
    pub(crate) fn signal_link_lost(&self, address: &str) -> bool {
        match self.active().as_ref() {
            Some(active) if active.channel.peer() == address => {
                active.link_lost.notify_one();
                true
            }
            _ => false,
        }
    }

    pub(crate) fn publish_error(&self, error: &ChatError) {
        let description = error.to_string();
        warn!("{}", description);
        self.last_error.send_replace(Some(description.clone()));
        let _ = self.errors.send(description);
    }
}
