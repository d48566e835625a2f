//! Interactive chat application
//!
//! Wraps a [`ChatController`] with the prompt loop: typed lines become
//! commands or messages, session events extend the transcript, and status
//! changes and errors are printed as they are published.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use bluechat_core::{
    BluetoothAdapter, ChatConfig, ChatController, ConnectionEvent, ConnectionStatus, Device,
    EventStream, Message,
};

use crate::error::Result;
use crate::input::{Input, HELP};

/// What the prompt loop does after a command
pub enum Flow {
    Continue,
    Session(EventStream),
    Quit,
}

pub struct ChatApp {
    controller: ChatController,
    transcript: Vec<Message>,
}

impl ChatApp {
    pub async fn new(adapter: Arc<dyn BluetoothAdapter>, config: ChatConfig) -> Result<Self> {
        let controller = ChatController::start(adapter, config).await?;
        Ok(Self {
            controller,
            transcript: Vec::new(),
        })
    }

    pub fn controller(&self) -> &ChatController {
        &self.controller
    }

    /// Messages sent and received so far, in order
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Discover for `duration` and return everything seen
    pub async fn scan(&self, duration: Duration) -> Result<Vec<Device>> {
        self.controller.start_discovery().await?;
        tokio::time::sleep(duration).await;
        self.controller.stop_discovery().await?;
        Ok(self.controller.scanned_devices().borrow().clone())
    }

    pub async fn paired(&self) -> Result<Vec<Device>> {
        Ok(self.controller.refresh_paired_devices().await?)
    }

    /// Paired devices followed by discovered ones not already paired
    pub fn known_devices(&self) -> Vec<Device> {
        let mut devices = self.controller.paired_devices().borrow().clone();
        for device in self.controller.scanned_devices().borrow().iter() {
            if !devices.iter().any(|known| known.address == device.address) {
                devices.push(device.clone());
            }
        }
        devices
    }

    /// Resolve a `/connect` target by list index, address or name
    pub fn resolve_device(&self, target: &str) -> Device {
        let known = self.known_devices();
        if let Ok(index) = target.parse::<usize>() {
            if let Some(device) = known.get(index) {
                return device.clone();
            }
        }
        known
            .into_iter()
            .find(|device| {
                device.address.eq_ignore_ascii_case(target) || device.name.as_deref() == Some(target)
            })
            .unwrap_or_else(|| Device::new(None, target))
    }

    // ------------------------------------------------------------------------
    // Prompt Loop
    // ------------------------------------------------------------------------

    /// Run the prompt until `/quit` or end of input
    pub async fn run_interactive(&mut self, mut session: Option<EventStream>) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut status = self.controller.status();
        let mut errors = self.controller.errors();

        println!("{}", status_line(&status.borrow_and_update()));
        println!("Type /help for commands.");

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match Input::parse(&line) {
                        Ok(Some(input)) => match self.execute(input).await? {
                            Flow::Continue => {}
                            Flow::Session(events) => session = Some(events),
                            Flow::Quit => break,
                        },
                        Ok(None) => {}
                        Err(usage) => println!("{}", usage),
                    }
                }
                event = next_session_event(&mut session) => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!("Session event stream ended");
                        session = None;
                    }
                },
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    println!("{}", status_line(&status.borrow_and_update()));
                }
                error = errors.recv() => match error {
                    Ok(description) => println!("Error: {}", description),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Missed {} error notifications", missed)
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        drop(session);
        self.shutdown().await;
        Ok(())
    }

    /// Carry out one prompt command
    pub async fn execute(&mut self, input: Input) -> Result<Flow> {
        match input {
            Input::Scan => match self.controller.start_discovery().await {
                Ok(()) => println!("Scanning..."),
                Err(e) => println!("Error: {}", e),
            },
            Input::StopScan => {
                if let Err(e) = self.controller.stop_discovery().await {
                    println!("Error: {}", e);
                }
            }
            Input::Paired => match self.paired().await {
                Ok(devices) => print_devices("Paired devices", &devices),
                Err(e) => println!("Error: {}", e),
            },
            Input::Devices => print_devices("Known devices", &self.known_devices()),
            Input::Listen => match self.controller.listen() {
                Ok(events) => return Ok(Flow::Session(events)),
                Err(e) => println!("Error: {}", e),
            },
            Input::Connect(target) => {
                let device = self.resolve_device(&target);
                info!("Connecting to {}", device);
                match self.controller.connect(device) {
                    Ok(events) => return Ok(Flow::Session(events)),
                    Err(e) => println!("Error: {}", e),
                }
            }
            Input::Send(text) => match self.controller.try_send(text).await {
                Ok(message) => {
                    println!("{}", format_message(&message));
                    self.transcript.push(message);
                }
                Err(e) => println!("Error: {}", e),
            },
            Input::Disconnect => self.controller.close_connection().await,
            Input::Status => println!("{}", status_line(&self.controller.status().borrow())),
            Input::History => {
                for message in &self.transcript {
                    println!("{}", format_message(message));
                }
            }
            Input::Help => println!("{}", HELP),
            Input::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Apply one session event to the transcript and the terminal
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Established => println!("Connection established"),
            ConnectionEvent::TransferSucceeded(message) => {
                println!("{}", format_message(&message));
                self.transcript.push(message);
            }
            // Also published on the error broadcast, which prints it
            ConnectionEvent::Error(description) => debug!("Session failed: {}", description),
        }
    }

    pub async fn shutdown(&self) {
        self.controller.shutdown().await;
    }
}

async fn next_session_event(session: &mut Option<EventStream>) -> Option<ConnectionEvent> {
    match session {
        Some(events) => events.next().await,
        None => std::future::pending().await,
    }
}

// ----------------------------------------------------------------------------
// Presentation
// ----------------------------------------------------------------------------

pub fn format_message(message: &Message) -> String {
    if message.originated_locally {
        format!("{} (me): {}", message.sender_name, message.text)
    } else {
        format!("{}: {}", message.sender_name, message.text)
    }
}

pub fn status_line(status: &ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Idle => "Status: not connected".to_string(),
        ConnectionStatus::Listening => "Status: waiting for a peer".to_string(),
        ConnectionStatus::Connecting { address } => format!("Status: connecting to {}", address),
        ConnectionStatus::Connected { address } => format!("Status: connected to {}", address),
    }
}

pub fn print_devices(title: &str, devices: &[Device]) {
    println!("{} ({}):", title, devices.len());
    for (index, device) in devices.iter().enumerate() {
        println!("  [{}] {} ({})", index, device.display_name(), device.address);
    }
}
