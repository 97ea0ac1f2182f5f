//! Service-level error taxonomy.

use veriprint_sensor::SensorError;

use crate::identity::IdentityError;

/// Errors returned synchronously to a caller of a service operation.
///
/// Session-internal failures never show up here; they are converted to
/// terminal signals inside the owning session.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Verify target has no enrolled record.
    #[error("no enrolled prints for user {0:?}")]
    NoEnrolledPrints(String),

    #[error("unknown user {0:?}")]
    UnknownUser(String),

    /// Another enroll/verify session is already in flight.
    #[error("another operation is in progress")]
    Busy,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable wire code reported over IPC.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoEnrolledPrints(_) => "no-enrolled-prints",
            Self::UnknownUser(_) => "unknown-user",
            Self::Busy => "busy",
            Self::InvalidArgument(_) => "invalid-argument",
            Self::Sensor(_) => "sensor-failure",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<IdentityError> for ServiceError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::UnknownUser(user) => Self::UnknownUser(user),
        }
    }
}
