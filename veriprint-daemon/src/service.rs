//! The device operation surface.
//!
//! One method per operation a caller can invoke over IPC. Methods
//! return synchronously-known results; everything session-shaped is
//! delegated to [`SessionManager`] and reported through signals.

use std::sync::Arc;

use tokio::task;

use veriprint_sensor::{SensorDriver, UserStore};

use crate::error::ServiceError;
use crate::identity::IdentityResolver;
use crate::sessions::SessionManager;

pub struct DeviceService {
    sensor: Arc<dyn SensorDriver>,
    store: Arc<dyn UserStore>,
    resolver: Arc<IdentityResolver>,
    sessions: SessionManager,
}

impl DeviceService {
    pub fn new(
        sensor: Arc<dyn SensorDriver>,
        store: Arc<dyn UserStore>,
        resolver: Arc<IdentityResolver>,
        sessions: SessionManager,
    ) -> Self {
        Self { sensor, store, resolver, sessions }
    }

    /// Acknowledge a power-suspend notice.
    pub fn suspend(&self) {
        tracing::info!("suspend notice acknowledged");
    }

    /// Re-establish sensor state after resume.
    pub async fn resume(&self) -> Result<(), ServiceError> {
        tracing::info!("resume: resetting secure channel");
        let sensor = self.sensor.clone();
        run_blocking(move || sensor.reset_secure_channel()).await??;
        Ok(())
    }

    /// Ordered designation labels for the user's enrolled fingers.
    /// Empty when the user has no record.
    pub fn list_enrolled_fingers(&self, user_name: &str) -> Result<Vec<String>, ServiceError> {
        let labels = match self.resolver.resolve_record(user_name)? {
            Some((_, record)) => {
                record.finger_labels().into_iter().map(str::to_string).collect()
            }
            None => Vec::new(),
        };
        Ok(labels)
    }

    /// Delete the user's record. Silent no-op when no record exists.
    pub fn delete_enrolled_fingers(&self, user_name: &str) -> Result<(), ServiceError> {
        match self.resolver.resolve_record(user_name)? {
            Some((sid, record)) => {
                tracing::info!(user = user_name, identity = %sid, db_id = record.db_id, "deleting record");
                self.store.delete_record(record.db_id)?;
            }
            None => {
                tracing::debug!(user = user_name, "no record to delete");
            }
        }
        Ok(())
    }

    pub fn start_verify(&self, user_name: &str, finger_hint: &str) -> Result<(), ServiceError> {
        self.sessions.start_verify(user_name, finger_hint)
    }

    pub fn start_enroll(&self, user_name: &str, designation: &str) -> Result<(), ServiceError> {
        self.sessions.start_enroll(user_name, designation)
    }

    pub fn cancel(&self) {
        self.sessions.cancel();
    }

    /// Hex-encoded pass-through to the secure channel.
    pub async fn run_cmd(&self, request_hex: &str) -> Result<String, ServiceError> {
        let request = hex::decode(request_hex)
            .map_err(|e| ServiceError::InvalidArgument(format!("bad hex request: {e}")))?;
        let sensor = self.sensor.clone();
        let response = run_blocking(move || sensor.raw_command(&request)).await??;
        Ok(hex::encode(response))
    }
}

async fn run_blocking<T: Send + 'static>(
    f: impl FnOnce() -> T + Send + 'static,
) -> Result<T, ServiceError> {
    task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Internal(format!("blocking task failed: {e}")))
}
