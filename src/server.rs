use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::decoder;
use crate::error::{Error, Result};
use crate::store::HistoryStore;

const READ_CHUNK: usize = 8192;

/// Bounds on a single producer connection.
#[derive(Debug, Clone, Copy)]
pub struct FrameLimits {
    /// Longest silence between two reads before the message is considered complete.
    pub idle_timeout: Duration,
    /// Longest time a connection may spend sending one payload.
    pub max_read_time: Duration,
    pub max_payload_bytes: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15),
            max_read_time: Duration::from_secs(60),
            max_payload_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Why a message stopped accumulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEnd {
    /// Peer closed or half-closed its side.
    Closed,
    IdleTimeout,
    Deadline,
    /// Transport error after some bytes had already arrived.
    Interrupted,
}

#[derive(Debug)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub end: FrameEnd,
}

/// Accumulates one payload. There is no length prefix: the message ends at
/// EOF, at a transport error, or when a timeout fires, whichever comes first.
pub async fn read_frame<R>(reader: &mut R, limits: &FrameLimits) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let deadline = Instant::now() + limits.max_read_time;
    let mut bytes = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    let end = loop {
        let idle_deadline = (Instant::now() + limits.idle_timeout).min(deadline);
        match time::timeout_at(idle_deadline, reader.read(&mut chunk)).await {
            Ok(Ok(0)) => break FrameEnd::Closed,
            Ok(Ok(n)) => {
                if bytes.len() + n > limits.max_payload_bytes {
                    return Err(Error::PayloadTooLarge { limit: limits.max_payload_bytes });
                }
                bytes.extend_from_slice(&chunk[..n]);
            }
            Ok(Err(e)) if bytes.is_empty() => return Err(Error::Connection(e)),
            Ok(Err(_)) => break FrameEnd::Interrupted,
            Err(_) if idle_deadline >= deadline => break FrameEnd::Deadline,
            Err(_) => break FrameEnd::IdleTimeout,
        }
    };
    Ok(Frame { bytes, end })
}

/// Accepts producer connections and merges each decoded payload into the store.
pub struct IngestServer {
    listener: TcpListener,
    store: Arc<HistoryStore>,
    limits: FrameLimits,
    next_conn: AtomicU64,
}

impl IngestServer {
    pub async fn bind(addr: &str, store: Arc<HistoryStore>, limits: FrameLimits) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self { listener, store, limits, next_conn: AtomicU64::new(1) })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop for the life of the process. Each connection gets
    /// its own task; nothing one connection does reaches the others.
    pub async fn run(self) {
        if let Ok(addr) = self.local_addr() {
            info!("well data listener ready on {}", addr);
        }

        loop {
            match self.listener.accept().await {
                Ok((socket, peer)) => {
                    let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
                    let store = self.store.clone();
                    let limits = self.limits;
                    tokio::spawn(async move {
                        match handle_client(socket, peer, conn, store, limits).await {
                            Ok(_) => {}
                            Err(e @ Error::MalformedPayload(_)) | Err(e @ Error::PayloadTooLarge { .. }) => {
                                warn!(conn, %peer, "discarding payload: {}", e);
                            }
                            Err(e @ Error::Connection(_)) => {
                                debug!(conn, %peer, "{}", e);
                            }
                            Err(e) => error!(conn, %peer, "failed to store payload: {}", e),
                        }
                    });
                }
                Err(e) => warn!("accept failed: {}", e),
            }
        }
    }
}

/// Handles one connection. Returns the number of records merged.
async fn handle_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    conn: u64,
    store: Arc<HistoryStore>,
    limits: FrameLimits,
) -> Result<usize> {
    let frame = read_frame(&mut stream, &limits).await?;

    if frame.bytes.is_empty() {
        debug!(conn, %peer, end = ?frame.end, "connection closed without data");
        return Ok(0);
    }
    if frame.end != FrameEnd::Closed {
        debug!(conn, %peer, end = ?frame.end, bytes = frame.bytes.len(), "treating partial read as complete message");
    }

    let records = decoder::decode(&frame.bytes)?;
    let count = records.len();
    let forecasts = records.iter().filter(|r| r.has_forecast()).count();
    info!(conn, %peer, records = count, forecasts, "received well records");

    if records.is_empty() {
        return Ok(0);
    }

    // File I/O stays off the reactor threads.
    tokio::task::spawn_blocking(move || store.merge(records)).await??;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn limits(idle_ms: u64, max_ms: u64, max_bytes: usize) -> FrameLimits {
        FrameLimits {
            idle_timeout: Duration::from_millis(idle_ms),
            max_read_time: Duration::from_millis(max_ms),
            max_payload_bytes: max_bytes,
        }
    }

    #[tokio::test]
    async fn frame_ends_at_close() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"[1,2,").await.unwrap();
        client.write_all(b"3]").await.unwrap();
        drop(client);

        let frame = read_frame(&mut server, &FrameLimits::default()).await.unwrap();
        assert_eq!(frame.bytes, b"[1,2,3]");
        assert_eq!(frame.end, FrameEnd::Closed);
    }

    #[tokio::test]
    async fn idle_timeout_completes_frame() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"{}").await.unwrap();

        let frame = read_frame(&mut server, &limits(50, 5_000, 1024)).await.unwrap();
        assert_eq!(frame.bytes, b"{}");
        assert_eq!(frame.end, FrameEnd::IdleTimeout);
        drop(client);
    }

    #[tokio::test]
    async fn deadline_bounds_a_trickling_peer() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            for _ in 0..100 {
                if client.write_all(b" ").await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let frame = read_frame(&mut server, &limits(500, 150, 1024)).await.unwrap();
        assert_eq!(frame.end, FrameEnd::Deadline);
        assert!(!frame.bytes.is_empty());
        drop(server);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[b'x'; 40]).await.unwrap();
        drop(client);

        let err = read_frame(&mut server, &limits(500, 5_000, 16)).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn silent_close_is_empty_frame() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let frame = read_frame(&mut server, &FrameLimits::default()).await.unwrap();
        assert!(frame.bytes.is_empty());
    }
}
