//! Signal hub: ordered, typed notifications for in-flight sessions.
//!
//! Sessions run on blocking workers; signals cross back to the
//! dispatch side through a broadcast channel that every connected IPC
//! client subscribes to. Per-session emitters enforce the ordering
//! contract: any number of non-terminal signals, then exactly one
//! terminal signal, guaranteed by `finish` consuming the emitter.

use tokio::sync::broadcast;

use veriprint_core::{DeviceSignal, EnrollResult, VerifyResult};

/// Broadcast capacity. Sessions emit at human scan rates, so clients
/// only lag if they stop reading entirely.
const SIGNAL_BUFFER: usize = 64;

/// Shared fan-out point for device signals.
#[derive(Clone)]
pub struct SignalHub {
    tx: broadcast::Sender<DeviceSignal>,
}

impl SignalHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceSignal> {
        self.tx.subscribe()
    }

    /// Emit a signal to all subscribers. No subscribers is fine.
    pub fn emit(&self, signal: DeviceSignal) {
        tracing::debug!(?signal, "emitting");
        let _ = self.tx.send(signal);
    }

    /// One-shot terminal enrollment failure, for requests rejected
    /// before any session starts (unknown finger designation).
    pub fn emit_enroll_failed(&self) {
        self.emit(DeviceSignal::EnrollStatus { result: EnrollResult::Failed, done: true });
    }

    pub fn enroll_session(&self) -> EnrollEmitter {
        EnrollEmitter { hub: self.clone() }
    }

    pub fn verify_session(&self) -> VerifyEmitter {
        VerifyEmitter { hub: self.clone() }
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Emitter for one enrollment session.
pub struct EnrollEmitter {
    hub: SignalHub,
}

impl EnrollEmitter {
    /// Non-terminal progress; may repeat.
    pub fn progress(&self, result: EnrollResult) {
        debug_assert!(!result.done());
        self.hub.emit(DeviceSignal::EnrollStatus { result, done: false });
    }

    /// Terminal result. Consumes the emitter: one per session.
    pub fn finish(self, result: EnrollResult) {
        debug_assert!(result.done());
        self.hub.emit(DeviceSignal::EnrollStatus { result, done: true });
    }
}

/// Emitter for one verification session.
pub struct VerifyEmitter {
    hub: SignalHub,
}

impl VerifyEmitter {
    /// Emitted once at verify start, before any scan progress.
    pub fn finger_selected(&self, finger: &str) {
        self.hub
            .emit(DeviceSignal::VerifyFingerSelected { finger: finger.to_string() });
    }

    /// Non-terminal progress; may repeat.
    pub fn progress(&self, result: VerifyResult) {
        debug_assert!(!result.done());
        self.hub.emit(DeviceSignal::VerifyStatus { result, done: false });
    }

    /// Terminal result. Consumes the emitter: one per session.
    pub fn finish(self, result: VerifyResult) {
        debug_assert!(result.done());
        self.hub.emit(DeviceSignal::VerifyStatus { result, done: true });
    }
}
