//! Service-level tests: the operation surface driven against the
//! virtual sensor, without the socket in between.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use veriprint_core::{DeviceSignal, EnrollResult, FingerPosition, Sid, VerifyResult};
use veriprint_daemon::error::ServiceError;
use veriprint_daemon::identity::{AccountLookup, IdentityResolver};
use veriprint_daemon::service::DeviceService;
use veriprint_daemon::sessions::SessionManager;
use veriprint_daemon::signals::SignalHub;
use veriprint_sensor::virt::IdentifyScript;
use veriprint_sensor::{IdentifyOutcome, VirtualSensor};

struct FixedAccounts(BTreeMap<String, u32>);

impl AccountLookup for FixedAccounts {
    fn uid_of(&self, user_name: &str) -> Option<u32> {
        self.0.get(user_name).copied()
    }
}

struct Harness {
    sensor: Arc<VirtualSensor>,
    service: DeviceService,
    signals: broadcast::Receiver<DeviceSignal>,
}

fn harness() -> Harness {
    let sensor = Arc::new(VirtualSensor::new());
    let accounts = FixedAccounts(BTreeMap::from([
        ("alice".to_string(), 1000),
        ("bob".to_string(), 1001),
    ]));
    let overrides = BTreeMap::from([(
        "alice".to_string(),
        "S-1-5-21-9-9-9-500".parse::<Sid>().unwrap(),
    )]);
    let resolver = Arc::new(IdentityResolver::new(
        Box::new(accounts),
        overrides,
        sensor.clone(),
    ));
    let hub = SignalHub::new();
    let signals = hub.subscribe();
    let (fatal_tx, _fatal_rx) = mpsc::unbounded_channel();
    let sessions = SessionManager::new(sensor.clone(), resolver.clone(), hub, fatal_tx);
    let service = DeviceService::new(sensor.clone(), sensor.clone(), resolver, sessions);
    Harness { sensor, service, signals }
}

async fn next_signal(rx: &mut broadcast::Receiver<DeviceSignal>) -> DeviceSignal {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for signal")
        .expect("signal channel closed")
}

#[tokio::test]
async fn list_is_empty_without_a_record() {
    let h = harness();
    assert_eq!(h.service.list_enrolled_fingers("bob").unwrap(), Vec::<String>::new());
}

#[tokio::test]
async fn list_reports_labels_in_record_order() {
    let h = harness();
    // Alice resolves through her configured override, not the uid
    // fallback; the record must be keyed accordingly.
    let sid: Sid = "S-1-5-21-9-9-9-500".parse().unwrap();
    h.sensor.seed_user(sid, &[FingerPosition::LeftRing, FingerPosition::RightThumb]);

    assert_eq!(
        h.service.list_enrolled_fingers("alice").unwrap(),
        vec!["left-ring-finger".to_string(), "right-thumb".to_string()]
    );
}

#[tokio::test]
async fn list_for_unknown_user_is_an_error() {
    let h = harness();
    assert!(matches!(
        h.service.list_enrolled_fingers("ghost"),
        Err(ServiceError::UnknownUser(_))
    ));
}

#[tokio::test]
async fn delete_removes_the_record_and_is_idempotent() {
    let h = harness();
    h.sensor.seed_user(Sid::from_uid(1001), &[FingerPosition::LeftThumb]);

    h.service.delete_enrolled_fingers("bob").unwrap();
    assert!(h.service.list_enrolled_fingers("bob").unwrap().is_empty());

    // Deleting again is a silent no-op.
    h.service.delete_enrolled_fingers("bob").unwrap();
}

#[tokio::test]
async fn verify_without_record_is_synchronous_and_emits_nothing() {
    let mut h = harness();
    let err = h.service.start_verify("bob", "any").unwrap_err();
    assert!(matches!(err, ServiceError::NoEnrolledPrints(_)));
    assert!(h.signals.try_recv().is_err());
}

#[tokio::test]
async fn verify_match_end_to_end() {
    let mut h = harness();
    let db_id = h.sensor.seed_user(Sid::from_uid(1001), &[FingerPosition::LeftRing]);
    h.sensor.push_identify(IdentifyScript {
        retries: 0,
        outcome: Ok(IdentifyOutcome {
            db_id,
            subtype: FingerPosition::LeftRing,
            template_hash: vec![0x01],
        }),
    });

    h.service.start_verify("bob", "left-ring-finger").unwrap();

    assert_eq!(
        next_signal(&mut h.signals).await,
        DeviceSignal::VerifyFingerSelected { finger: "any".to_string() }
    );
    assert_eq!(
        next_signal(&mut h.signals).await,
        DeviceSignal::VerifyStatus { result: VerifyResult::Match, done: true }
    );
    assert!(h.signals.try_recv().is_err());
}

#[tokio::test]
async fn enroll_then_verify_round_trip() {
    let mut h = harness();
    h.sensor.push_enroll(veriprint_sensor::virt::EnrollScript::completing(2));
    h.service.start_enroll("bob", "left-ring-finger").unwrap();

    loop {
        let signal = next_signal(&mut h.signals).await;
        if signal.is_terminal() {
            assert_eq!(
                signal,
                DeviceSignal::EnrollStatus { result: EnrollResult::Completed, done: true }
            );
            break;
        }
    }

    // The freshly stored record is visible and verifiable.
    let fingers = h.service.list_enrolled_fingers("bob").unwrap();
    assert_eq!(fingers, vec!["left-ring-finger".to_string()]);
}

#[tokio::test]
async fn run_cmd_round_trips_hex() {
    let h = harness();
    // Virtual backend echoes the request with a 9000 trailer.
    assert_eq!(h.service.run_cmd("0102").await.unwrap(), "01029000");
}

#[tokio::test]
async fn run_cmd_rejects_bad_hex() {
    let h = harness();
    assert!(matches!(
        h.service.run_cmd("zz").await,
        Err(ServiceError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn suspend_and_resume_are_acknowledged() {
    let h = harness();
    h.service.suspend();
    h.service.resume().await.unwrap();
}

#[tokio::test]
async fn cancel_with_no_session_has_no_observable_effect() {
    let mut h = harness();
    h.service.cancel();
    assert!(h.signals.try_recv().is_err());
}
