//! IPC surface: length-delimited JSON frames over a Unix socket.
//!
//! Wire format: 4-byte big-endian length prefix followed by a JSON
//! payload. Clients send [`Request`] frames and receive [`ServerFrame`]
//! replies plus unsolicited signal frames fanned out from the hub.

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};

use veriprint_core::DeviceSignal;

use crate::error::ServiceError;
use crate::service::DeviceService;
use crate::signals::SignalHub;

/// Maximum frame size (1 MB). Requests are tiny; this bounds a
/// misbehaving client.
const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Per-connection outbound queue depth.
const OUTBOUND_BUFFER: usize = 32;

/// Read a length-delimited frame from an async reader.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Bytes> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes"),
        ));
    }

    let mut buf = BytesMut::with_capacity(len);
    buf.resize(len, 0);
    reader.read_exact(&mut buf).await?;

    Ok(buf.freeze())
}

/// Write a length-delimited frame to an async writer.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {} bytes", data.len()),
        ));
    }

    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;

    Ok(())
}

fn any_finger() -> String {
    "any".to_string()
}

/// An operation a caller can invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Operation {
    Suspend,
    Resume,
    ListEnrolledFingers { username: String },
    DeleteEnrolledFingers { username: String },
    VerifyStart {
        username: String,
        #[serde(default = "any_finger")]
        finger: String,
    },
    Cancel,
    EnrollStart { username: String, finger: String },
    RunCmd { request: String },
}

/// A client request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Caller-chosen correlation id, echoed in the reply.
    pub id: u64,
    #[serde(flatten)]
    pub op: Operation,
}

/// Error payload carried in a failed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
}

impl From<&ServiceError> for WireError {
    fn from(e: &ServiceError) -> Self {
        Self { code: e.code().to_string(), message: e.to_string() }
    }
}

/// A daemon-to-client frame: a correlated reply or an unsolicited
/// signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    Reply {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<WireError>,
    },
    Signal {
        #[serde(flatten)]
        signal: DeviceSignal,
    },
}

impl ServerFrame {
    fn reply(id: u64, outcome: Result<serde_json::Value, ServiceError>) -> Self {
        match outcome {
            Ok(result) => Self::Reply { id, result: Some(result), error: None },
            Err(ref e) => Self::Reply { id, result: None, error: Some(e.into()) },
        }
    }
}

/// Route one operation to the service.
pub async fn dispatch(
    service: &DeviceService,
    op: Operation,
) -> Result<serde_json::Value, ServiceError> {
    use serde_json::Value;

    match op {
        Operation::Suspend => {
            service.suspend();
            Ok(Value::Null)
        }
        Operation::Resume => service.resume().await.map(|()| Value::Null),
        Operation::ListEnrolledFingers { username } => {
            let fingers = service.list_enrolled_fingers(&username)?;
            Ok(serde_json::to_value(fingers).unwrap_or(Value::Null))
        }
        Operation::DeleteEnrolledFingers { username } => {
            service.delete_enrolled_fingers(&username).map(|()| Value::Null)
        }
        Operation::VerifyStart { username, finger } => {
            service.start_verify(&username, &finger).map(|()| Value::Null)
        }
        Operation::Cancel => {
            service.cancel();
            Ok(Value::Null)
        }
        Operation::EnrollStart { username, finger } => {
            service.start_enroll(&username, &finger).map(|()| Value::Null)
        }
        Operation::RunCmd { request } => service.run_cmd(&request).await.map(Value::String),
    }
}

/// Accept loop for the daemon socket.
pub async fn serve(
    listener: UnixListener,
    service: Arc<DeviceService>,
    hub: SignalHub,
) -> io::Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        tracing::debug!("client connected");
        let service = service.clone();
        let hub = hub.clone();
        tokio::spawn(async move {
            handle_connection(stream, service, hub).await;
            tracing::debug!("client disconnected");
        });
    }
}

/// Handle one client connection.
///
/// Three tasks per connection, the read/write-loop split: the read loop
/// dispatches requests, a forward task copies hub signals into the
/// outbound queue, and the write loop drains that queue to the socket.
pub async fn handle_connection(stream: UnixStream, service: Arc<DeviceService>, hub: SignalHub) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(OUTBOUND_BUFFER);

    let write_handle = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let payload = match serde_json::to_vec(&frame) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode frame");
                    continue;
                }
            };
            if let Err(e) = write_frame(&mut write_half, &payload).await {
                tracing::debug!(error = %e, "write failed, closing connection");
                break;
            }
        }
    });

    let mut signal_rx = hub.subscribe();
    let signal_tx = tx.clone();
    let signal_handle = tokio::spawn(async move {
        loop {
            match signal_rx.recv().await {
                Ok(signal) => {
                    if signal_tx.send(ServerFrame::Signal { signal }).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "client lagged behind signal stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    loop {
        let frame = match read_frame(&mut read_half).await {
            Ok(frame) => frame,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::debug!(error = %e, "read failed, closing connection");
                break;
            }
        };

        let request: Request = match serde_json::from_slice(&frame) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request");
                let error = WireError {
                    code: "invalid-request".to_string(),
                    message: e.to_string(),
                };
                let reply = ServerFrame::Reply { id: 0, result: None, error: Some(error) };
                if tx.send(reply).await.is_err() {
                    break;
                }
                continue;
            }
        };

        tracing::debug!(id = request.id, op = ?request.op, "request");
        let outcome = dispatch(&service, request.op).await;
        if let Err(ref e) = outcome {
            tracing::debug!(id = request.id, error = %e, "request failed");
        }
        if tx.send(ServerFrame::reply(request.id, outcome)).await.is_err() {
            break;
        }
    }

    signal_handle.abort();
    drop(tx);
    let _ = write_handle.await;
}
