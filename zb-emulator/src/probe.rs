//! Connectivity probe
//!
//! Opens a connection, sends an OpenSession frame and reports the raw bytes
//! that come back.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use zb_protocol::{encode_request, Opcode, StatusCode};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Greeting plus the OpenSession reply
const EXPECTED_LEN: usize = 2;

/// Send `00 00` to `addr` and collect the reply bytes
///
/// Stops once the greeting and the OpenSession reply have arrived, the peer
/// closes, or `timeout` elapses with at least one byte received.
pub async fn probe(addr: &str, timeout: Duration) -> io::Result<Vec<u8>> {
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
    debug!("Connected to {}", addr);

    let request = encode_request(Opcode::OpenSession.as_u8(), &[])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    stream.write_all(&request).await?;

    let mut received = Vec::new();
    let mut buffer = [0u8; 64];
    while received.len() < EXPECTED_LEN {
        match tokio::time::timeout(timeout, stream.read(&mut buffer)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => received.extend_from_slice(&buffer[..n]),
            Ok(Err(e)) => return Err(e),
            Err(_) if !received.is_empty() => break,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "no reply before timeout",
                ))
            }
        }
    }
    Ok(received)
}

/// Space-separated uppercase hex
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One-line verdict for a probe reply
pub fn describe(bytes: &[u8]) -> String {
    match bytes.first() {
        Some(&b) if b == StatusCode::Success.as_u8() => {
            format!("Received: {} (SUCCESS)", hex(bytes))
        }
        Some(&b) => match StatusCode::try_from(b) {
            Ok(status) => format!("Received: {} ({})", hex(bytes), status.name()),
            Err(_) => format!("Received: {} (unexpected status)", hex(bytes)),
        },
        None => "Received nothing".to_string(),
    }
}
