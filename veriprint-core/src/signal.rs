//! Typed progress and result signals for in-flight sessions.
//!
//! Signals are the only channel for session progress: ordered per
//! session, delivered out-of-band from the call that started it. The
//! wire strings match what desktop authentication frameworks expect.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result value carried by an `EnrollStatus` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrollResult {
    /// A scan was rejected; the user should retry.
    #[serde(rename = "enroll-retry-scan")]
    RetryScan,
    /// A scan was accepted; more stages remain.
    #[serde(rename = "enroll-stage-passed")]
    StagePassed,
    /// Enrollment finished and the template was stored.
    #[serde(rename = "enroll-completed")]
    Completed,
    /// Enrollment ended without storing a template.
    #[serde(rename = "enroll-failed")]
    Failed,
}

impl EnrollResult {
    /// True for results that end the session.
    pub fn done(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RetryScan => "enroll-retry-scan",
            Self::StagePassed => "enroll-stage-passed",
            Self::Completed => "enroll-completed",
            Self::Failed => "enroll-failed",
        }
    }
}

impl fmt::Display for EnrollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result value carried by a `VerifyStatus` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyResult {
    /// A scan was rejected; the user should retry.
    #[serde(rename = "verify-retry-scan")]
    RetryScan,
    /// The scanned finger matched the target user.
    #[serde(rename = "verify-match")]
    Match,
    /// The scan completed but did not match the target user.
    #[serde(rename = "verify-no-match")]
    NoMatch,
}

impl VerifyResult {
    /// True for results that end the session.
    pub fn done(self) -> bool {
        matches!(self, Self::Match | Self::NoMatch)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RetryScan => "verify-retry-scan",
            Self::Match => "verify-match",
            Self::NoMatch => "verify-no-match",
        }
    }
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An out-of-band notification delivered to every connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum DeviceSignal {
    /// Progress or terminal result for an enrollment session.
    EnrollStatus { result: EnrollResult, done: bool },
    /// Progress or terminal result for a verification session.
    VerifyStatus { result: VerifyResult, done: bool },
    /// Emitted once at verify start, naming the awaited finger.
    VerifyFingerSelected { finger: String },
}

impl DeviceSignal {
    /// True when this signal terminates its session.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::EnrollStatus { done, .. } | Self::VerifyStatus { done, .. } => *done,
            Self::VerifyFingerSelected { .. } => false,
        }
    }
}
