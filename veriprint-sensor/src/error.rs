//! Sensor error taxonomy.

use std::io;

/// Errors surfaced by a sensor backend.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// USB/transport-level failure. The shared sensor state is assumed
    /// unrecoverable without a fresh process, so this class is fatal to
    /// the daemon, not just to the failing session.
    #[error("hardware failure: {0}")]
    Hardware(String),

    /// The sensor firmware requires a reboot before it can be used.
    /// Detected while opening the device; the daemon exits cleanly so
    /// the service manager restarts it after the reboot.
    #[error("sensor requires a reboot")]
    RebootNeeded,

    /// Malformed or unexpected response within the sensor protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The in-flight call was unblocked by `cancel()`.
    #[error("operation canceled")]
    Canceled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SensorError {
    /// True only for the transport-failure class that must stop the
    /// whole process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Hardware(_))
    }
}
