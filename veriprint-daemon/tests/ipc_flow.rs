//! Socket-level tests: a raw client speaking the framed JSON protocol
//! against a served daemon socket.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use veriprint_core::Sid;
use veriprint_daemon::identity::{AccountLookup, IdentityResolver};
use veriprint_daemon::ipc::{self, read_frame, write_frame, Operation, Request, ServerFrame};
use veriprint_daemon::service::DeviceService;
use veriprint_daemon::sessions::SessionManager;
use veriprint_daemon::signals::SignalHub;
use veriprint_core::FingerPosition;
use veriprint_sensor::virt::EnrollScript;
use veriprint_sensor::VirtualSensor;

struct FixedAccounts(BTreeMap<String, u32>);

impl AccountLookup for FixedAccounts {
    fn uid_of(&self, user_name: &str) -> Option<u32> {
        self.0.get(user_name).copied()
    }
}

struct Client {
    stream: UnixStream,
    next_id: u64,
}

impl Client {
    async fn connect(socket: &std::path::Path) -> Self {
        let stream = UnixStream::connect(socket).await.unwrap();
        Self { stream, next_id: 1 }
    }

    async fn send(&mut self, op: Operation) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let payload = serde_json::to_vec(&Request { id, op }).unwrap();
        write_frame(&mut self.stream, &payload).await.unwrap();
        id
    }

    async fn next_frame(&mut self) -> ServerFrame {
        let frame = timeout(Duration::from_secs(2), read_frame(&mut self.stream))
            .await
            .expect("timed out waiting for frame")
            .unwrap();
        serde_json::from_slice(&frame).unwrap()
    }

    /// Read frames until the reply for `id` arrives, collecting any
    /// interleaved signals. Replies and signals race on the wire, so
    /// tests must tolerate either order.
    async fn reply_for(&mut self, id: u64) -> (ServerFrame, Vec<ServerFrame>) {
        let mut signals = Vec::new();
        loop {
            let frame = self.next_frame().await;
            match frame {
                ServerFrame::Reply { id: got, .. } if got == id => return (frame, signals),
                ServerFrame::Signal { .. } => signals.push(frame),
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    /// Read frames until a terminal signal arrives.
    async fn signals_until_terminal(&mut self) -> Vec<veriprint_core::DeviceSignal> {
        let mut seen = Vec::new();
        loop {
            if let ServerFrame::Signal { signal } = self.next_frame().await {
                let terminal = signal.is_terminal();
                seen.push(signal);
                if terminal {
                    return seen;
                }
            }
        }
    }
}

fn spawn_daemon(sensor: Arc<VirtualSensor>) -> std::path::PathBuf {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("veriprintd.sock");

    let accounts = FixedAccounts(BTreeMap::from([
        ("alice".to_string(), 1000),
        ("bob".to_string(), 1001),
    ]));
    let resolver = Arc::new(IdentityResolver::new(
        Box::new(accounts),
        BTreeMap::new(),
        sensor.clone(),
    ));
    let hub = SignalHub::new();
    let (fatal_tx, _fatal_rx) = mpsc::unbounded_channel();
    let sessions = SessionManager::new(sensor.clone(), resolver.clone(), hub.clone(), fatal_tx);
    let service = Arc::new(DeviceService::new(
        sensor.clone(),
        sensor,
        resolver,
        sessions,
    ));

    let listener = UnixListener::bind(&socket).unwrap();
    tokio::spawn(ipc::serve(listener, service, hub));

    // Keep the tempdir alive for the whole test process.
    std::mem::forget(dir);
    socket
}

fn assert_ok_reply(frame: &ServerFrame) {
    match frame {
        ServerFrame::Reply { error: None, .. } => {}
        other => panic!("expected ok reply, got {other:?}"),
    }
}

fn error_code(frame: &ServerFrame) -> String {
    match frame {
        ServerFrame::Reply { error: Some(err), .. } => err.code.clone(),
        other => panic!("expected error reply, got {other:?}"),
    }
}

#[tokio::test]
async fn list_and_delete_over_the_wire() {
    let sensor = Arc::new(VirtualSensor::new());
    sensor.seed_user(Sid::from_uid(1000), &[FingerPosition::LeftRing]);
    let socket = spawn_daemon(sensor);
    let mut client = Client::connect(&socket).await;

    let id = client
        .send(Operation::ListEnrolledFingers { username: "alice".to_string() })
        .await;
    let (reply, _) = client.reply_for(id).await;
    match reply {
        ServerFrame::Reply { result: Some(value), error: None, .. } => {
            assert_eq!(value, serde_json::json!(["left-ring-finger"]));
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    let id = client
        .send(Operation::DeleteEnrolledFingers { username: "alice".to_string() })
        .await;
    assert_ok_reply(&client.reply_for(id).await.0);

    let id = client
        .send(Operation::ListEnrolledFingers { username: "alice".to_string() })
        .await;
    let (reply, _) = client.reply_for(id).await;
    match reply {
        ServerFrame::Reply { result: Some(value), .. } => {
            assert_eq!(value, serde_json::json!([]));
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn verify_without_record_is_an_error_reply() {
    let socket = spawn_daemon(Arc::new(VirtualSensor::new()));
    let mut client = Client::connect(&socket).await;

    let id = client
        .send(Operation::VerifyStart { username: "bob".to_string(), finger: "any".to_string() })
        .await;
    let (reply, signals) = client.reply_for(id).await;
    assert_eq!(error_code(&reply), "no-enrolled-prints");
    assert!(signals.is_empty());
}

#[tokio::test]
async fn enroll_streams_signals_to_the_client() {
    let sensor = Arc::new(VirtualSensor::new());
    sensor.push_enroll(EnrollScript::completing(2));
    let socket = spawn_daemon(sensor);
    let mut client = Client::connect(&socket).await;

    let id = client
        .send(Operation::EnrollStart {
            username: "bob".to_string(),
            finger: "left-ring-finger".to_string(),
        })
        .await;
    let (reply, mut early) = client.reply_for(id).await;
    assert_ok_reply(&reply);

    let mut signals: Vec<_> = early
        .drain(..)
        .map(|f| match f {
            ServerFrame::Signal { signal } => signal,
            other => panic!("unexpected frame: {other:?}"),
        })
        .collect();
    if signals.last().map(|s| s.is_terminal()) != Some(true) {
        signals.extend(client.signals_until_terminal().await);
    }

    let strings: Vec<String> = signals
        .iter()
        .map(|s| serde_json::to_string(s).unwrap())
        .collect();
    assert_eq!(signals.len(), 3, "signals were: {strings:?}");
    assert!(signals[..2].iter().all(|s| !s.is_terminal()));
    assert!(signals[2].is_terminal());
}

#[tokio::test]
async fn unknown_finger_over_the_wire_yields_ok_reply_and_terminal_failure() {
    let socket = spawn_daemon(Arc::new(VirtualSensor::new()));
    let mut client = Client::connect(&socket).await;

    let id = client
        .send(Operation::EnrollStart {
            username: "bob".to_string(),
            finger: "left-unknown-finger".to_string(),
        })
        .await;
    let (reply, mut signals) = client.reply_for(id).await;
    assert_ok_reply(&reply);

    if signals.is_empty() {
        if let ServerFrame::Signal { signal } = client.next_frame().await {
            signals.push(ServerFrame::Signal { signal });
        }
    }
    match &signals[0] {
        ServerFrame::Signal { signal } => {
            assert!(signal.is_terminal());
            assert_eq!(
                serde_json::to_value(signal).unwrap()["result"],
                "enroll-failed"
            );
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[tokio::test]
async fn run_cmd_and_cancel_over_the_wire() {
    let socket = spawn_daemon(Arc::new(VirtualSensor::new()));
    let mut client = Client::connect(&socket).await;

    let id = client.send(Operation::RunCmd { request: "a1b2".to_string() }).await;
    let (reply, _) = client.reply_for(id).await;
    match reply {
        ServerFrame::Reply { result: Some(value), error: None, .. } => {
            assert_eq!(value, serde_json::json!("a1b29000"));
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    let id = client.send(Operation::Cancel).await;
    assert_ok_reply(&client.reply_for(id).await.0);

    let id = client.send(Operation::Suspend).await;
    assert_ok_reply(&client.reply_for(id).await.0);

    let id = client.send(Operation::Resume).await;
    assert_ok_reply(&client.reply_for(id).await.0);
}

#[tokio::test]
async fn malformed_request_gets_an_error_reply() {
    let socket = spawn_daemon(Arc::new(VirtualSensor::new()));
    let mut client = Client::connect(&socket).await;

    write_frame(&mut client.stream, b"{not json").await.unwrap();
    let frame = client.next_frame().await;
    assert_eq!(error_code(&frame), "invalid-request");
}
