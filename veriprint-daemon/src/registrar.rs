//! Manager registration loop.
//!
//! The desktop authentication manager runs on its own lifecycle; this
//! loop connects to its well-known socket, announces the device, then
//! holds the connection open. EOF means the manager went away, so the
//! loop reconnects and re-registers whenever it reappears. Outbound
//! only: registration failures never abort the daemon.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;

use crate::ipc::write_frame;

/// Delay between connection attempts while the manager is absent.
const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Registration announcement sent to the manager.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterDevice {
    pub op: &'static str,
    /// Socket path where this device serves its operations.
    pub socket: String,
    /// Device selector string, e.g. `usb-1-4`.
    pub device: String,
    pub driver: &'static str,
}

impl RegisterDevice {
    pub fn new(socket: String, device: String) -> Self {
        Self { op: "register-device", socket, device, driver: "veriprint" }
    }
}

/// Run the registration loop forever.
pub async fn run_registrar(manager_socket: PathBuf, announcement: RegisterDevice) {
    let mut was_connected = true;
    loop {
        match UnixStream::connect(&manager_socket).await {
            Ok(stream) => {
                was_connected = true;
                if let Err(e) = register_and_watch(stream, &announcement).await {
                    tracing::warn!(error = %e, "manager connection failed");
                }
                tracing::info!("manager went away, watching for it to return");
            }
            Err(e) => {
                // Only log the first failure of each outage.
                if was_connected {
                    tracing::debug!(
                        manager = %manager_socket.display(),
                        error = %e,
                        "manager not available"
                    );
                    was_connected = false;
                }
            }
        }
        tokio::time::sleep(RETRY_INTERVAL).await;
    }
}

/// Send the announcement, then block until the manager disconnects.
async fn register_and_watch(
    mut stream: UnixStream,
    announcement: &RegisterDevice,
) -> std::io::Result<()> {
    let payload = serde_json::to_vec(announcement)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    write_frame(&mut stream, &payload).await?;
    tracing::info!(device = %announcement.device, "registered with manager");

    // Drain until EOF; the manager sends nothing we act on.
    let mut buf = [0u8; 256];
    loop {
        match stream.read(&mut buf).await? {
            0 => return Ok(()),
            n => tracing::trace!(bytes = n, "ignoring manager chatter"),
        }
    }
}
