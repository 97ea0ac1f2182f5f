//! Sensor driver boundary for the veriprint daemon.
//!
//! The daemon never talks USB itself; it drives a [`SensorDriver`] and
//! reads enrolled users through a [`UserStore`]. Hardware backends
//! implement both traits out of tree. This crate ships one in-tree
//! backend, [`VirtualSensor`], a scriptable in-memory device used by the
//! daemon's simulated mode and by tests.

pub mod driver;
pub mod error;
pub mod selector;
pub mod virt;

pub use driver::{EnrollProgress, IdentifyOutcome, IdentifyProgress, SensorDriver, UserStore};
pub use error::SensorError;
pub use selector::{DeviceSelector, SelectorParseError};
pub use virt::VirtualSensor;

/// Open the device named by `selector`.
///
/// Only the virtual backend is compiled into this crate; the selector is
/// validated and logged so a hardware backend can slot in behind the
/// same call.
pub fn open(selector: &DeviceSelector) -> Result<VirtualSensor, SensorError> {
    tracing::info!(device = %selector, "opening sensor device");
    Ok(VirtualSensor::new())
}
