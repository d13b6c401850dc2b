//! Relay Engine
//!
//! Two independent unidirectional pump loops per session. Each direction
//! reads at most one chunk, writes and flushes it downstream before
//! reading again, and gives up after the configured idle timeout. The
//! relay is a raw byte pump with no knowledge of request/response
//! boundaries, so the idle timeout is the only way to reclaim sockets
//! from sessions the origin keeps open long after the client is gone.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Read chunk size per direction. Back-pressure bounds in-flight data to
/// one chunk per direction.
const CHUNK_SIZE: usize = 4096;

/// Default bounded wait for new data on a pump loop.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);

/// Reusable bidirectional copy primitive, invoked identically by both
/// hops once negotiation finishes.
#[derive(Debug, Clone, Copy)]
pub struct RelayEngine {
    idle_timeout: Duration,
}

impl RelayEngine {
    pub fn new() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    /// Pump bytes between two duplex streams until both directions have
    /// finished. The directions fail independently: one closing or
    /// erroring merely lets the other observe end-of-stream on its own.
    /// Returns the byte counts (a-to-b, b-to-a) for diagnostics.
    pub async fn relay<A, B>(&self, a: A, b: B) -> (u64, u64)
    where
        A: AsyncRead + AsyncWrite + Unpin,
        B: AsyncRead + AsyncWrite + Unpin,
    {
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);

        let (forward, backward) = tokio::join!(
            self.pump(a_read, b_write, "uplink"),
            self.pump(b_read, a_write, "downlink"),
        );
        debug!(forward, backward, "both relay directions finished");
        (forward, backward)
    }

    /// One direction's read-then-write loop. Every exit path is silent
    /// from the caller's perspective; errors are logged, not raised.
    async fn pump<R, W>(&self, mut src: R, mut dst: W, direction: &str) -> u64
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = [0u8; CHUNK_SIZE];
        let mut copied = 0u64;

        loop {
            match timeout(self.idle_timeout, src.read(&mut buf)).await {
                Err(_) => {
                    debug!(direction, copied, "relay direction idle, assuming abandoned");
                    break;
                }
                Ok(Ok(0)) => {
                    trace!(direction, copied, "relay direction closed by peer");
                    break;
                }
                Ok(Ok(n)) => {
                    if let Err(e) = self.forward_chunk(&mut dst, &buf[..n]).await {
                        debug!(direction, copied, error = %e, "relay write failed");
                        break;
                    }
                    copied += n as u64;
                }
                Ok(Err(e)) => {
                    debug!(direction, copied, error = %e, "relay read failed");
                    break;
                }
            }
        }

        // Signal end-of-data downstream; the owning component closes the
        // streams entirely during its own teardown.
        let _ = dst.shutdown().await;
        copied
    }

    async fn forward_chunk<W>(&self, dst: &mut W, chunk: &[u8]) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        dst.write_all(chunk).await?;
        // Wait for the flush before reading again: never read ahead of
        // what has been delivered downstream.
        dst.flush().await
    }
}

impl Default for RelayEngine {
    fn default() -> Self {
        Self::new()
    }
}
