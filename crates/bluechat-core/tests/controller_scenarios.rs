//! Scenario tests for the chat controller over the loopback adapter
//!
//! Each test wires two or more controllers to one `LoopbackRadio` and drives
//! listen/connect sessions end to end.

use std::sync::Arc;
use std::time::Duration;

use bluechat_core::loopback::{LoopbackAdapter, LoopbackRadio};
use bluechat_core::{
    BluetoothAdapter, ChatConfig, ChatController, ChatError, ConnectionEvent, ConnectionStatus,
    Device, EventStream, Listener, Message, Permission, SERVICE_UUID,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

const ALICE: &str = "AA:BB:CC:DD:EE:FF";
const BOB: &str = "11:22:33:44:55:66";
const CAROL: &str = "77:88:99:AA:BB:CC";
const WAIT: Duration = Duration::from_secs(2);

async fn controller(adapter: &Arc<LoopbackAdapter>) -> ChatController {
    controller_with(adapter, ChatConfig::default()).await
}

async fn controller_with(adapter: &Arc<LoopbackAdapter>, config: ChatConfig) -> ChatController {
    ChatController::start(adapter.clone(), config)
        .await
        .expect("controller should start")
}

/// Consume an event stream on a background task
fn drain(mut events: EventStream) -> mpsc::UnboundedReceiver<ConnectionEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if tx.send(event).is_err() {
                break;
            }
        }
    });
    rx
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> Option<ConnectionEvent> {
    timeout(WAIT, rx.recv()).await.expect("timed out waiting for event")
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

/// Start listening on `server` and wait until the listener is registered
async fn listening(
    radio: &LoopbackRadio,
    server: &ChatController,
    address: &str,
) -> mpsc::UnboundedReceiver<ConnectionEvent> {
    let rx = drain(server.listen().expect("listen should be permitted"));
    eventually(|| radio.is_listening(address, SERVICE_UUID)).await;
    rx
}

// ----------------------------------------------------------------------------
// Connection Scenarios
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_client_connect_and_receive() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let alice_ctl = controller(&alice).await;
    let bob_ctl = controller(&bob).await;

    let mut alice_events = listening(&radio, &alice_ctl, ALICE).await;
    let mut bob_events = drain(bob_ctl.connect(alice.device().clone()).unwrap());

    assert_eq!(next_event(&mut bob_events).await, Some(ConnectionEvent::Established));
    assert_eq!(next_event(&mut alice_events).await, Some(ConnectionEvent::Established));
    assert!(bob_ctl.is_connected());
    assert_eq!(
        *bob_ctl.status().borrow(),
        ConnectionStatus::Connected {
            address: ALICE.to_string()
        }
    );
    assert_eq!(
        *alice_ctl.status().borrow(),
        ConnectionStatus::Connected {
            address: BOB.to_string()
        }
    );

    let sent = alice_ctl.try_send("hi").await.unwrap();
    assert_eq!(sent, Message::local("Alice", "hi"));
    assert_eq!(
        next_event(&mut bob_events).await,
        Some(ConnectionEvent::TransferSucceeded(Message {
            text: "hi".to_string(),
            sender_name: "Alice".to_string(),
            originated_locally: false,
        }))
    );

    let reply = bob_ctl.try_send("hello back").await.unwrap();
    assert!(reply.originated_locally);
    assert_eq!(
        next_event(&mut alice_events).await,
        Some(ConnectionEvent::TransferSucceeded(Message::remote("Bob", "hello back")))
    );

    bob_ctl.close_connection().await;
    assert!(!bob_ctl.is_connected());
    assert_eq!(next_event(&mut bob_events).await, None);
    // Peer closed cleanly: the listener's stream ends without an error
    assert_eq!(next_event(&mut alice_events).await, None);
    eventually(|| alice_ctl.status().borrow().is_idle()).await;
    assert!(alice_ctl.last_error().borrow().is_none());
}

#[tokio::test]
async fn test_raw_peer_frames_are_decoded() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let bob_ctl = controller(&bob).await;

    let mut listener = alice
        .open_listener("raw", SERVICE_UUID)
        .await
        .unwrap();
    let mut bob_events = drain(bob_ctl.connect(alice.device().clone()).unwrap());
    let (mut stream, address) = listener.accept().await.unwrap();
    assert_eq!(address, BOB);
    assert_eq!(next_event(&mut bob_events).await, Some(ConnectionEvent::Established));

    use tokio::io::AsyncWriteExt;
    let payload = b"Alice-##+hi";
    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(payload).await.unwrap();

    assert_eq!(
        next_event(&mut bob_events).await,
        Some(ConnectionEvent::TransferSucceeded(Message::remote("Alice", "hi")))
    );

    // Abrupt end in the middle of a frame surfaces as one error
    stream.write_all(&100u32.to_be_bytes()).await.unwrap();
    stream.write_all(b"partial").await.unwrap();
    drop(stream);

    match next_event(&mut bob_events).await {
        Some(ConnectionEvent::Error(_)) => {}
        other => panic!("expected error event, got {:?}", other),
    }
    assert_eq!(next_event(&mut bob_events).await, None);
    assert!(bob_ctl.last_error().borrow().is_some());
    assert!(bob_ctl.status().borrow().is_idle());
}

#[tokio::test]
async fn test_connect_failure_emits_single_error() {
    let radio = LoopbackRadio::new();
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let bob_ctl = controller(&bob).await;

    let unreachable = Device::new(None, "00:00:00:00:00:00");
    let events: Vec<ConnectionEvent> = timeout(WAIT, bob_ctl.connect(unreachable).unwrap().collect())
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ConnectionEvent::Error(_)));
    assert!(bob_ctl.status().borrow().is_idle());
    assert!(bob_ctl.last_error().borrow().is_some());
    assert_eq!(bob.stream_stats().opened, 0);
}

#[tokio::test]
async fn test_send_without_connection() {
    let radio = LoopbackRadio::new();
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let bob_ctl = controller(&bob).await;

    let result = bob_ctl.try_send("hello").await;
    assert!(matches!(result, Err(ChatError::NotConnected)));
    assert!(bob_ctl.last_error().borrow().is_none());
    assert!(bob_ctl.status().borrow().is_idle());
}

#[tokio::test]
async fn test_listener_serves_one_peer() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let carol = Arc::new(radio.adapter(CAROL, Some("Carol")));
    let alice_ctl = controller(&alice).await;
    let bob_ctl = controller(&bob).await;
    let carol_ctl = controller(&carol).await;

    let mut alice_events = listening(&radio, &alice_ctl, ALICE).await;
    let mut bob_events = drain(bob_ctl.connect(alice.device().clone()).unwrap());
    assert_eq!(next_event(&mut alice_events).await, Some(ConnectionEvent::Established));
    assert_eq!(next_event(&mut bob_events).await, Some(ConnectionEvent::Established));
    assert!(!radio.is_listening(ALICE, SERVICE_UUID));

    let late: Vec<ConnectionEvent> = timeout(WAIT, carol_ctl.connect(alice.device().clone()).unwrap().collect())
        .await
        .unwrap();
    assert_eq!(late.len(), 1);
    assert!(matches!(late[0], ConnectionEvent::Error(_)));

    // The first pair is unaffected
    bob_ctl.try_send("still here").await.unwrap();
    assert_eq!(
        next_event(&mut alice_events).await,
        Some(ConnectionEvent::TransferSucceeded(Message::remote("Bob", "still here")))
    );
}

#[tokio::test]
async fn test_dial_queued_on_dropped_listener_is_refused() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));

    let listener = alice.open_listener("raw", SERVICE_UUID).await.unwrap();
    let dialing = {
        let bob = bob.clone();
        tokio::spawn(async move { bob.open_outbound_stream(ALICE, SERVICE_UUID).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!dialing.is_finished());
    drop(listener);

    match timeout(WAIT, dialing).await.unwrap().unwrap() {
        Ok(_) => panic!("dial to a dropped listener should be refused"),
        Err(ChatError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused),
        Err(other) => panic!("unexpected error: {}", other),
    }
    assert_eq!(bob.stream_stats().opened, 0);
}

#[tokio::test]
async fn test_accept_failure_emits_error() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let alice_ctl = controller(&alice).await;

    let mut alice_events = listening(&radio, &alice_ctl, ALICE).await;
    radio.power_off(ALICE);

    match next_event(&mut alice_events).await {
        Some(ConnectionEvent::Error(reason)) => assert!(reason.contains("listener closed")),
        other => panic!("expected error event, got {:?}", other),
    }
    assert_eq!(next_event(&mut alice_events).await, None);
    assert!(alice_ctl.status().borrow().is_idle());
}

#[tokio::test]
async fn test_accept_timeout() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let config = ChatConfig::default().with_accept_timeout(Duration::from_millis(50));
    let alice_ctl = controller_with(&alice, config).await;

    let mut alice_events = drain(alice_ctl.listen().unwrap());
    match next_event(&mut alice_events).await {
        Some(ConnectionEvent::Error(reason)) => {
            assert_eq!(reason, "accept timed out after 50ms")
        }
        other => panic!("expected timeout error, got {:?}", other),
    }
    assert_eq!(next_event(&mut alice_events).await, None);
    assert!(!radio.is_listening(ALICE, SERVICE_UUID));
}

// ----------------------------------------------------------------------------
// Resource Lifecycle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_event_stream_is_cold() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let alice_ctl = controller(&alice).await;

    let events = alice_ctl.listen().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!radio.is_listening(ALICE, SERVICE_UUID));
    assert!(alice_ctl.status().borrow().is_idle());

    let _rx = drain(events);
    eventually(|| radio.is_listening(ALICE, SERVICE_UUID)).await;
    assert_eq!(*alice_ctl.status().borrow(), ConnectionStatus::Listening);
}

#[tokio::test]
async fn test_dropping_stream_cancels_listen() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let alice_ctl = controller(&alice).await;

    let mut events = alice_ctl.listen().unwrap();
    // Poll once so the session starts, then drop the stream
    let _ = timeout(Duration::from_millis(50), events.next()).await;
    assert!(radio.is_listening(ALICE, SERVICE_UUID));
    drop(events);

    eventually(|| !radio.is_listening(ALICE, SERVICE_UUID)).await;
    eventually(|| alice_ctl.status().borrow().is_idle()).await;
}

#[tokio::test]
async fn test_reconnect_closes_previous_stream_once() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let carol = Arc::new(radio.adapter(CAROL, Some("Carol")));
    let alice_ctl = controller(&alice).await;
    let bob_ctl = controller(&bob).await;
    let carol_ctl = controller(&carol).await;

    let mut alice_events = listening(&radio, &alice_ctl, ALICE).await;
    let mut first = drain(bob_ctl.connect(alice.device().clone()).unwrap());
    assert_eq!(next_event(&mut first).await, Some(ConnectionEvent::Established));
    assert_eq!(next_event(&mut alice_events).await, Some(ConnectionEvent::Established));
    assert_eq!(bob.stream_stats().opened, 1);
    assert_eq!(bob.stream_stats().closed, 0);

    let mut carol_events = listening(&radio, &carol_ctl, CAROL).await;
    let mut second = drain(bob_ctl.connect(carol.device().clone()).unwrap());
    assert_eq!(next_event(&mut second).await, Some(ConnectionEvent::Established));
    assert_eq!(next_event(&mut carol_events).await, Some(ConnectionEvent::Established));

    // The first session ended without error before the second stream opened
    assert_eq!(next_event(&mut first).await, None);
    let stats = bob.stream_stats();
    assert_eq!(stats.opened, 2);
    assert_eq!(stats.closed, 1);
    assert_eq!(
        *bob_ctl.status().borrow(),
        ConnectionStatus::Connected {
            address: CAROL.to_string()
        }
    );

    // Alice saw her peer go away cleanly
    assert_eq!(next_event(&mut alice_events).await, None);

    bob_ctl.close_connection().await;
    assert_eq!(bob.stream_stats().closed, 2);
    assert_eq!(bob.stream_stats().open(), 0);
}

#[tokio::test]
async fn test_close_connection_is_idempotent() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let alice_ctl = controller(&alice).await;
    let bob_ctl = controller(&bob).await;

    // Nothing held yet
    bob_ctl.close_connection().await;

    let mut alice_events = listening(&radio, &alice_ctl, ALICE).await;
    let mut bob_events = drain(bob_ctl.connect(alice.device().clone()).unwrap());
    assert_eq!(next_event(&mut bob_events).await, Some(ConnectionEvent::Established));
    assert_eq!(next_event(&mut alice_events).await, Some(ConnectionEvent::Established));

    // Peer hangs up; the session ends on its own
    alice_ctl.close_connection().await;
    assert_eq!(next_event(&mut bob_events).await, None);
    eventually(|| bob_ctl.status().borrow().is_idle()).await;

    bob_ctl.close_connection().await;
    bob_ctl.close_connection().await;
    assert_eq!(bob.stream_stats().opened, 1);
    assert_eq!(bob.stream_stats().closed, 1);
    assert!(matches!(
        bob_ctl.try_send("anyone?").await,
        Err(ChatError::NotConnected)
    ));
}

#[tokio::test]
async fn test_close_connection_with_stalled_send() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let alice_ctl = controller(&alice).await;
    let bob_ctl = controller_with(&bob, ChatConfig::default().with_event_buffer(1)).await;

    let mut alice_events = listening(&radio, &alice_ctl, ALICE).await;
    // Bob stops polling after Established, so his session stops reading
    let mut bob_events = bob_ctl.connect(alice.device().clone()).unwrap();
    assert_eq!(
        timeout(WAIT, bob_events.next()).await.unwrap(),
        Some(ConnectionEvent::Established)
    );
    assert_eq!(next_event(&mut alice_events).await, Some(ConnectionEvent::Established));

    for text in ["one", "two", "three"] {
        alice_ctl.try_send(text).await.unwrap();
    }
    let sending = {
        let alice_ctl = alice_ctl.clone();
        tokio::spawn(async move { alice_ctl.try_send("x".repeat(300 * 1024)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!sending.is_finished());

    timeout(WAIT, alice_ctl.close_connection())
        .await
        .expect("close_connection waited on the stalled send");
    let result = timeout(WAIT, sending).await.unwrap().unwrap();
    assert!(matches!(result, Err(ChatError::NotConnected)));
    assert!(alice_ctl.status().borrow().is_idle());

    timeout(WAIT, bob_ctl.shutdown()).await.unwrap();
    drop(bob_events);
}

#[tokio::test]
async fn test_shutdown_closes_everything() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let alice_ctl = controller(&alice).await;
    let bob_ctl = controller(&bob).await;

    let mut alice_events = listening(&radio, &alice_ctl, ALICE).await;
    let mut bob_events = drain(bob_ctl.connect(alice.device().clone()).unwrap());
    assert_eq!(next_event(&mut bob_events).await, Some(ConnectionEvent::Established));
    assert_eq!(next_event(&mut alice_events).await, Some(ConnectionEvent::Established));

    bob_ctl.start_discovery().await.unwrap();
    bob_ctl.shutdown().await;
    bob_ctl.shutdown().await;

    assert!(!bob.is_discovering());
    assert_eq!(bob.stream_stats().open(), 0);
    assert_eq!(next_event(&mut bob_events).await, None);
    assert_eq!(next_event(&mut alice_events).await, None);
}

// ----------------------------------------------------------------------------
// Discovery and Platform Notifications
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_scanned_devices_are_deduplicated() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let bob_ctl = controller(&bob).await;

    bob_ctl.start_discovery().await.unwrap();
    assert!(bob.is_discovering());
    eventually(|| bob_ctl.scanned_devices().borrow().len() == 1).await;

    let headset = Device::new(Some("Headset".to_string()), "01:02:03:04:05:06");
    bob.inject_discovered(alice.device().clone());
    bob.inject_discovered(headset.clone());
    bob.inject_discovered(headset.clone());
    eventually(|| bob_ctl.scanned_devices().borrow().len() == 2).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let scanned = bob_ctl.scanned_devices().borrow().clone();
    assert_eq!(scanned, vec![alice.device().clone(), headset]);

    bob_ctl.stop_discovery().await.unwrap();
    assert!(!bob.is_discovering());
}

#[tokio::test]
async fn test_connect_stops_discovery() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let alice_ctl = controller(&alice).await;
    let bob_ctl = controller(&bob).await;

    bob_ctl.start_discovery().await.unwrap();
    let _alice_events = listening(&radio, &alice_ctl, ALICE).await;
    let mut bob_events = drain(bob_ctl.connect(alice.device().clone()).unwrap());
    assert_eq!(next_event(&mut bob_events).await, Some(ConnectionEvent::Established));
    assert!(!bob.is_discovering());
}

#[tokio::test]
async fn test_paired_devices_refresh() {
    let radio = LoopbackRadio::new();
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let alice_device = Device::new(Some("Alice".to_string()), ALICE);
    bob.bond(alice_device.clone());
    let bob_ctl = controller(&bob).await;

    assert_eq!(*bob_ctl.paired_devices().borrow(), vec![alice_device.clone()]);

    let carol_device = Device::new(None, CAROL);
    bob.bond(carol_device.clone());
    bob_ctl.start_discovery().await.unwrap();
    assert_eq!(
        *bob_ctl.paired_devices().borrow(),
        vec![alice_device, carol_device]
    );
}

#[tokio::test]
async fn test_permission_denied_is_reported() {
    let radio = LoopbackRadio::new();
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let bob_ctl = controller(&bob).await;

    bob.set_permission(Permission::Scan, false);
    assert!(matches!(
        bob_ctl.start_discovery().await,
        Err(ChatError::PermissionDenied {
            permission: Permission::Scan
        })
    ));
    assert!(!bob.is_discovering());

    bob.set_permission(Permission::Connect, false);
    assert!(matches!(
        bob_ctl.listen(),
        Err(ChatError::PermissionDenied {
            permission: Permission::Connect
        })
    ));
    assert!(bob_ctl
        .connect(Device::new(None, ALICE))
        .is_err());
    assert!(matches!(
        bob_ctl.try_send("hi").await,
        Err(ChatError::PermissionDenied { .. })
    ));
    assert!(matches!(
        bob_ctl.refresh_paired_devices().await,
        Err(ChatError::PermissionDenied { .. })
    ));
}

#[tokio::test]
async fn test_unpaired_link_event_publishes_error() {
    let radio = LoopbackRadio::new();
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    let bob_ctl = controller(&bob).await;
    let mut errors = bob_ctl.errors();

    bob.inject_link_event(Device::new(None, ALICE), true);

    let error = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(error, format!("Can't connect to a non-paired device: {}", ALICE));
    assert_eq!(bob_ctl.last_error().borrow().as_deref(), Some(error.as_str()));
    assert!(!bob_ctl.is_connected());
}

#[tokio::test]
async fn test_bonded_link_loss_ends_session() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let bob = Arc::new(radio.adapter(BOB, Some("Bob")));
    bob.bond(alice.device().clone());
    let alice_ctl = controller(&alice).await;
    let bob_ctl = controller(&bob).await;

    let _alice_events = listening(&radio, &alice_ctl, ALICE).await;
    let mut bob_events = drain(bob_ctl.connect(alice.device().clone()).unwrap());
    assert_eq!(next_event(&mut bob_events).await, Some(ConnectionEvent::Established));

    // A link-up notification for the bonded peer changes nothing
    bob.inject_link_event(alice.device().clone(), true);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(bob_ctl.is_connected());

    bob.inject_link_event(alice.device().clone(), false);
    assert_eq!(
        next_event(&mut bob_events).await,
        Some(ConnectionEvent::Error(format!("Connection lost to {}", ALICE)))
    );
    assert_eq!(next_event(&mut bob_events).await, None);
    assert!(!bob_ctl.is_connected());
    assert_eq!(bob.stream_stats().open(), 0);
}

#[tokio::test]
async fn test_unknown_sender_placeholder() {
    let radio = LoopbackRadio::new();
    let alice = Arc::new(radio.adapter(ALICE, Some("Alice")));
    let anonymous = Arc::new(radio.adapter(BOB, None));
    let alice_ctl = controller(&alice).await;
    let anonymous_ctl = controller(&anonymous).await;

    let mut alice_events = listening(&radio, &alice_ctl, ALICE).await;
    let mut events = drain(anonymous_ctl.connect(alice.device().clone()).unwrap());
    assert_eq!(next_event(&mut events).await, Some(ConnectionEvent::Established));
    assert_eq!(next_event(&mut alice_events).await, Some(ConnectionEvent::Established));

    let sent = anonymous_ctl.try_send("who am I").await.unwrap();
    assert_eq!(sent.sender_name, "Unknown name");
    assert_eq!(
        next_event(&mut alice_events).await,
        Some(ConnectionEvent::TransferSucceeded(Message::remote(
            "Unknown name",
            "who am I"
        )))
    );
}
