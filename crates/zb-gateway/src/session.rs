//! Per-connection session loop
//!
//! A session greets the client with the OpenSession success byte, then reads
//! one frame at a time, dispatches it and writes the reply. It ends on
//! CloseSession, on EOF, on a frame cut short, on idle timeout, on transport
//! error or when the coordinator shuts down.
//!
//! The loop is generic over the stream so tests can drive it through
//! `tokio::io::duplex()`.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use zb_protocol::{FrameCodec, Opcode, StatusCode};

use crate::dispatcher::Dispatcher;

const READ_BUFFER_LEN: usize = 512;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent CloseSession
    ClientClosed,
    /// Client disconnected between frames
    Disconnected,
    /// Connection stalled or closed in the middle of a frame
    IncompleteFrame,
    /// Nothing received within the idle timeout
    IdleTimeout,
    /// The coordinator is shutting down
    Shutdown,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SessionEnd::ClientClosed => "closed by client",
            SessionEnd::Disconnected => "client disconnected",
            SessionEnd::IncompleteFrame => "incomplete frame",
            SessionEnd::IdleTimeout => "idle timeout",
            SessionEnd::Shutdown => "coordinator shutting down",
        };
        f.write_str(reason)
    }
}

/// Run one session to completion
pub async fn run_session<S>(
    mut stream: S,
    peer: &str,
    dispatcher: Dispatcher,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let idle_timeout = dispatcher.timings().idle_timeout();
    let mut codec = FrameCodec::new();
    let mut buffer = [0u8; READ_BUFFER_LEN];

    write_reply(&mut stream, &StatusCode::Success.reply()).await?;
    info!("Session opened with {}", peer);

    loop {
        while let Some(frame) = codec.next_frame() {
            info!(
                "Command 0x{:02X} from {}, params: {} bytes",
                frame.opcode,
                peer,
                frame.params.len()
            );

            let reply = dispatcher.dispatch(frame.opcode, &frame.params);
            if let Some(delay) = reply.delay {
                if hold(delay, &mut shutdown).await {
                    return Ok(SessionEnd::Shutdown);
                }
            }
            write_reply(&mut stream, &reply.bytes).await?;

            if frame.opcode() == Some(Opcode::CloseSession) {
                return Ok(SessionEnd::ClientClosed);
            }
        }

        let read = tokio::select! {
            result = tokio::time::timeout(idle_timeout, stream.read(&mut buffer)) => result,
            _ = shutdown.wait_for(|&stop| stop) => return Ok(SessionEnd::Shutdown),
        };

        match read {
            Ok(Ok(0)) => {
                return Ok(if codec.has_partial() {
                    warn!("Incomplete parameters from {}", peer);
                    SessionEnd::IncompleteFrame
                } else {
                    SessionEnd::Disconnected
                });
            }
            Ok(Ok(n)) => {
                debug!("Read {} bytes from {}: {:02X?}", n, peer, &buffer[..n]);
                codec.push_bytes(&buffer[..n]);
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Ok(if codec.has_partial() {
                    warn!(
                        "Incomplete frame from {}: {} bytes missing",
                        peer,
                        codec.missing()
                    );
                    SessionEnd::IncompleteFrame
                } else {
                    SessionEnd::IdleTimeout
                });
            }
        }
    }
}

/// Wait out a reply delay; true if shutdown came first
async fn hold(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.wait_for(|&stop| stop) => true,
    }
}

async fn write_reply<S>(stream: &mut S, bytes: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await
}
