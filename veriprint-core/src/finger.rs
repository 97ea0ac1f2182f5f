//! Finger designations and the sensor position table.
//!
//! Callers name fingers with `<hand>-<finger-word>` designations such as
//! `"left-ring-finger"`. The sensor speaks ANSI-381 position codes
//! (1..=10, right thumb through left little). This module owns the
//! mapping in both directions.

use serde::{Deserialize, Serialize};

/// ANSI-381 finger position, as stored in enrolled templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FingerPosition {
    RightThumb = 1,
    RightIndex = 2,
    RightMiddle = 3,
    RightRing = 4,
    RightLittle = 5,
    LeftThumb = 6,
    LeftIndex = 7,
    LeftMiddle = 8,
    LeftRing = 9,
    LeftLittle = 10,
}

/// Composite lookup key -> position. Hand code is `LH` for `left`,
/// `RH` for anything else; the finger keyword is the remaining
/// designation words joined with underscores, upper-cased.
const FINGER_TABLE: &[(&str, &str, FingerPosition)] = &[
    ("RH", "THUMB", FingerPosition::RightThumb),
    ("RH", "INDEX_FINGER", FingerPosition::RightIndex),
    ("RH", "MIDDLE_FINGER", FingerPosition::RightMiddle),
    ("RH", "RING_FINGER", FingerPosition::RightRing),
    ("RH", "LITTLE_FINGER", FingerPosition::RightLittle),
    ("LH", "THUMB", FingerPosition::LeftThumb),
    ("LH", "INDEX_FINGER", FingerPosition::LeftIndex),
    ("LH", "MIDDLE_FINGER", FingerPosition::LeftMiddle),
    ("LH", "RING_FINGER", FingerPosition::LeftRing),
    ("LH", "LITTLE_FINGER", FingerPosition::LeftLittle),
];

impl FingerPosition {
    /// Numeric code as stored by the sensor.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Position for a raw sensor code, if in range.
    pub fn from_code(code: u8) -> Option<Self> {
        FINGER_TABLE.iter().map(|&(_, _, p)| p).find(|p| p.code() == code)
    }

    /// The caller-facing designation label, e.g. `"left-ring-finger"`.
    pub fn label(self) -> &'static str {
        match self {
            Self::RightThumb => "right-thumb",
            Self::RightIndex => "right-index-finger",
            Self::RightMiddle => "right-middle-finger",
            Self::RightRing => "right-ring-finger",
            Self::RightLittle => "right-little-finger",
            Self::LeftThumb => "left-thumb",
            Self::LeftIndex => "left-index-finger",
            Self::LeftMiddle => "left-middle-finger",
            Self::LeftRing => "left-ring-finger",
            Self::LeftLittle => "left-little-finger",
        }
    }
}

/// Split a designation into its table key.
///
/// Returns `None` for an empty designation. The hand word is consumed
/// even when it is not `left`; every non-left hand maps to `RH`.
fn designation_key(designation: &str) -> Option<(&'static str, String)> {
    let mut words = designation.split('-');
    let hand = match words.next()? {
        "left" => "LH",
        _ => "RH",
    };
    let keyword = words.collect::<Vec<_>>().join("_").to_uppercase();
    if keyword.is_empty() {
        return None;
    }
    Some((hand, keyword))
}

/// Resolve a `<hand>-<finger-word>` designation to a sensor position.
///
/// `None` when the composite key is not in the table; callers report
/// that as a terminal enrollment failure rather than an error.
pub fn parse_designation(designation: &str) -> Option<FingerPosition> {
    let (hand, keyword) = designation_key(designation)?;
    FINGER_TABLE
        .iter()
        .find(|&&(h, k, _)| h == hand && k == keyword)
        .map(|&(_, _, p)| p)
}
