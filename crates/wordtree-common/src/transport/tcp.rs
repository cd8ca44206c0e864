use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::error::{Result, WordTreeError};

/// Maximum message size (100 MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// TCP framing for WordTree.
///
/// Every socket operation goes through an explicit deadline so a stalled
/// peer can only hold a pool slot for `timeout`, never indefinitely. The
/// outcome of each step is surfaced as a `Result`.
///
/// # Wire Protocol
///
/// ```text
/// [4-byte length as u32 big-endian] [JSON data]
/// ```
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use wordtree_common::transport::TcpTransport;
///
/// # #[tokio::main]
/// # async fn main() -> wordtree_common::Result<()> {
/// let timeout = Duration::from_secs(5);
/// let mut stream = TcpTransport::connect("127.0.0.1:8505".parse().unwrap(), timeout).await?;
/// TcpTransport::write_frame(&mut stream, b"[\"hello\"]", timeout).await?;
/// TcpTransport::close(&mut stream, timeout).await?;
/// # Ok(())
/// # }
/// ```
pub struct TcpTransport;

impl TcpTransport {
    /// Connects to `addr`, giving up after `timeout`.
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
        let stream = Self::with_deadline(timeout, TcpStream::connect(addr))
            .await?
            .map_err(|e| WordTreeError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;

        // Frames are tiny and written once; don't let Nagle hold them back
        stream
            .set_nodelay(true)
            .map_err(|e| Self::map_io_error(e, "configuring stream", timeout))?;

        Ok(stream)
    }

    /// Writes one length-prefixed frame and flushes it.
    pub async fn write_frame<S>(stream: &mut S, data: &[u8], timeout: Duration) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(WordTreeError::MessageTooLarge {
                size: data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let len = data.len() as u32;

        Self::with_deadline(timeout, async {
            stream.write_all(&len.to_be_bytes()).await?;
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await?
        .map_err(|e| Self::map_io_error(e, "writing frame", timeout))
    }

    /// Reads one length-prefixed frame.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Reading the length prefix or the body fails or exceeds `timeout`
    /// - The announced length exceeds [`MAX_MESSAGE_SIZE`]
    pub async fn read_frame<S>(stream: &mut S, timeout: Duration) -> Result<Vec<u8>>
    where
        S: AsyncRead + Unpin,
    {
        let mut len_buf = [0u8; 4];
        Self::with_deadline(timeout, stream.read_exact(&mut len_buf))
            .await?
            .map_err(|e| Self::map_io_error(e, "reading length prefix", timeout))?;

        let len = u32::from_be_bytes(len_buf) as usize;

        // Validate length to prevent allocation of excessively large buffers
        if len > MAX_MESSAGE_SIZE {
            return Err(WordTreeError::MessageTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let mut buf = vec![0u8; len];
        Self::with_deadline(timeout, stream.read_exact(&mut buf))
            .await?
            .map_err(|e| Self::map_io_error(e, "reading data", timeout))?;

        Ok(buf)
    }

    /// Shuts down the write half so the peer sees a clean end of stream.
    pub async fn close<S>(stream: &mut S, timeout: Duration) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        Self::with_deadline(timeout, stream.shutdown())
            .await?
            .map_err(|e| Self::map_io_error(e, "closing stream", timeout))
    }

    async fn with_deadline<F: Future>(timeout: Duration, fut: F) -> Result<F::Output> {
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| WordTreeError::Timeout(timeout.as_millis() as u64))
    }

    /// Map IO errors to appropriate WordTreeError variants
    ///
    /// - Timeouts/would block -> `Timeout`
    /// - Connection errors -> `Connection`
    /// - Other IO errors -> `Io`
    pub fn map_io_error(err: std::io::Error, context: &str, timeout: Duration) -> WordTreeError {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                WordTreeError::Timeout(timeout.as_millis() as u64)
            }
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => {
                WordTreeError::Connection(format!("{}: Connection lost", context))
            }
            _ => WordTreeError::Io(err),
        }
    }
}
