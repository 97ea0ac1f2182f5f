//! Security identifiers and enrolled-user records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::finger::FingerPosition;

/// Template used to synthesize identifiers from a numeric account ID.
///
/// The trailing component is the uid; the domain components are fixed so
/// that the same account always maps to the same identifier.
const SID_TEMPLATE_PREFIX: &str = "S-1-5-21-111111111-1111111111-1111111111";

/// A structured security identifier for an OS account.
///
/// String-backed and immutable once computed. Either parsed from a
/// configured override or synthesized from the account's uid via
/// [`Sid::from_uid`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sid(String);

impl Sid {
    /// Synthesize an identifier for an account with no configured override.
    ///
    /// Deterministic: the uid becomes the trailing component of a fixed
    /// domain-relative template.
    pub fn from_uid(uid: u32) -> Self {
        Self(format!("{SID_TEMPLATE_PREFIX}-{uid}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error parsing an identifier string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid security identifier: {0:?}")]
pub struct SidParseError(pub String);

impl FromStr for Sid {
    type Err = SidParseError;

    /// Validates the overall shape: an `S-` prefix followed by
    /// dash-separated numeric components.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("S-")
            .ok_or_else(|| SidParseError(s.to_string()))?;
        if rest.is_empty() || !rest.split('-').all(|c| !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit())) {
            return Err(SidParseError(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

/// A single enrolled finger within a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolledFinger {
    /// Finger-position classification assigned at enrollment time.
    pub subtype: FingerPosition,
}

/// The persisted representation of an enrolled user.
///
/// Owned by the external user store; the daemon only reads records and
/// requests deletion by `db_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Store-assigned record identifier.
    pub db_id: u32,
    /// Enrolled fingers, in enrollment order.
    pub fingers: Vec<EnrolledFinger>,
}

impl UserRecord {
    /// Designation labels for the enrolled fingers, in record order.
    pub fn finger_labels(&self) -> Vec<&'static str> {
        self.fingers.iter().map(|f| f.subtype.label()).collect()
    }
}
