//! Driver and user-store traits.

use veriprint_core::{FingerPosition, Sid, UserRecord};

use crate::error::SensorError;

/// Intermediate progress reported during an enrollment call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollProgress {
    /// A scan was accepted; the stage counter advanced.
    StagePassed,
    /// A scan was rejected and must be retried.
    BadScan(String),
}

/// Intermediate progress reported during an identify call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifyProgress {
    /// A scan was rejected and must be retried.
    BadScan(String),
}

/// Result of a successful identify call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyOutcome {
    /// Record identifier of the matched template's owner.
    pub db_id: u32,
    /// Which enrolled finger matched.
    pub subtype: FingerPosition,
    /// Hash of the matched template, for audit logging.
    pub template_hash: Vec<u8>,
}

/// A fingerprint sensor backend.
///
/// `enroll` and `identify` block the calling thread until the session
/// reaches an outcome; the daemon runs them on dedicated blocking
/// workers. `cancel` is the only way to unblock them early and may be
/// called from any thread.
pub trait SensorDriver: Send + Sync {
    /// Run an enrollment session for `identity` on `position`,
    /// reporting each intermediate scan through `progress`.
    fn enroll(
        &self,
        identity: &Sid,
        position: FingerPosition,
        progress: &mut dyn FnMut(EnrollProgress),
    ) -> Result<(), SensorError>;

    /// Wait for a finger, match it against all enrolled templates, and
    /// report who matched.
    fn identify(
        &self,
        progress: &mut dyn FnMut(IdentifyProgress),
    ) -> Result<IdentifyOutcome, SensorError>;

    /// Request cancellation of any in-flight enroll/identify call.
    /// Fire-and-forget; a safe no-op when nothing is in flight.
    fn cancel(&self);

    /// Re-establish the secure channel after a power transition.
    fn reset_secure_channel(&self) -> Result<(), SensorError>;

    /// Opaque request/response pass-through to the secure channel.
    fn raw_command(&self, request: &[u8]) -> Result<Vec<u8>, SensorError>;
}

/// Read access to the enrolled-user database.
///
/// The store is owned by the backend (typically sensor flash); the
/// daemon only looks records up and requests deletion.
pub trait UserStore: Send + Sync {
    /// The record for `sid`, if one exists. Absence is a legitimate
    /// outcome, not an error.
    fn lookup_user(&self, sid: &Sid) -> Option<UserRecord>;

    /// Delete the record with the given identifier. No-op if no such
    /// record exists.
    fn delete_record(&self, db_id: u32) -> Result<(), SensorError>;
}
