//! Core domain types for the veriprint fingerprint daemon.
//!
//! This crate is I/O-free: security identifiers, enrolled-user records,
//! the finger-position table, and the typed progress/result signals that
//! sessions emit. The daemon and the sensor boundary both build on it.

pub mod finger;
pub mod identity;
pub mod signal;

pub use finger::FingerPosition;
pub use identity::{EnrolledFinger, Sid, SidParseError, UserRecord};
pub use signal::{DeviceSignal, EnrollResult, VerifyResult};
