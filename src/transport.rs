//! Transport (spec component B): a persistent framed TCP connection.
//!
//! Connect retries on a fixed interval up to a deadline, matching the
//! original client's patience waiting for a debuggee to come up. Once
//! connected, a single background task owns the read half and hands decoded
//! frames to the dispatcher; the write half is shared behind a mutex so
//! multiple callers can send concurrently without interleaving partial
//! writes.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::codec::{self, Frame};
use crate::error::Error;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_CHUNK: usize = 1024;

pub struct Transport {
    write_half: Mutex<tokio::net::tcp::OwnedWriteHalf>,
}

impl Transport {
    /// Retry-connect to `addr` until it succeeds or `timeout` elapses.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<(Self, TransportReader), Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    info!(addr, "connected to debuggee");
                    let (read_half, write_half) = stream.into_split();
                    let transport = Transport {
                        write_half: Mutex::new(write_half),
                    };
                    let reader = TransportReader {
                        read_half,
                        buf: Vec::new(),
                    };
                    return Ok((transport, reader));
                }
                Err(err) => {
                    if tokio::time::Instant::now() >= deadline {
                        warn!(addr, %err, "giving up connecting to debuggee");
                        return Err(Error::ConnectFailed);
                    }
                    debug!(addr, %err, "connect failed, retrying");
                    tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                }
            }
        }
    }

    pub fn default_timeout() -> Duration {
        DEFAULT_CONNECT_TIMEOUT
    }

    /// Encode and send a single frame, holding the write lock only for the
    /// duration of the write itself.
    pub async fn send(&self, cmd: crate::protocol::Cmd, id: u64, args: &[String]) -> Result<(), Error> {
        let line = codec::encode(cmd, id, args);
        let mut guard = self.write_half.lock().await;
        guard.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

/// Owns the read half; runs as a background task that splits incoming bytes
/// on newlines and decodes each line into a [`Frame`].
pub struct TransportReader {
    read_half: tokio::net::tcp::OwnedReadHalf,
    buf: Vec<u8>,
}

impl TransportReader {
    /// Read and decode frames until the connection closes, handing each one
    /// to `on_frame`. Returns when the peer closes the socket (a zero-length
    /// read), which callers treat as "the debuggee process exited".
    pub async fn run(mut self, on_frame: Arc<dyn Fn(Frame) + Send + Sync>) {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = match self.read_half.read(&mut chunk).await {
                Ok(0) => {
                    info!("debuggee closed the connection");
                    return;
                }
                Ok(n) => n,
                Err(err) => {
                    warn!(%err, "transport read failed");
                    return;
                }
            };
            self.buf.extend_from_slice(&chunk[..n]);
            while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = self.buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]);
                match codec::decode(&line) {
                    Ok(frame) => on_frame(frame),
                    Err(err) => warn!(%err, line = %line, "dropping unparseable frame"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_succeeds_against_a_listening_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });
        let (_, _reader) = Transport::connect(&addr.to_string(), Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn connect_times_out_against_nothing_listening() {
        // A port nobody is bound to: loopback connects are refused quickly,
        // but the retry loop should still respect the overall deadline.
        let result = Transport::connect("127.0.0.1:1", Duration::from_millis(200)).await;
        assert!(matches!(result, Err(Error::ConnectFailed)));
    }

    #[tokio::test]
    async fn reader_splits_frames_across_partial_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"501\t1\t").await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            sock.write_all(b"\n102\t2\tfoo\n").await.unwrap();
        });
        let (_, reader) = Transport::connect(&addr.to_string(), Duration::from_secs(1))
            .await
            .unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let seen: Arc<Mutex<Vec<Frame>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let handle: Arc<dyn Fn(Frame) + Send + Sync> = Arc::new(move |f: Frame| {
            count2.fetch_add(1, Ordering::SeqCst);
            let seen2 = seen2.clone();
            tokio::spawn(async move {
                seen2.lock().await.push(f);
            });
        });
        let run = tokio::spawn(reader.run(handle));
        server.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        run.abort();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
