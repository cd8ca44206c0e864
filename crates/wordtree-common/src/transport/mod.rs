//! WordTree Transport Layer
//!
//! This module provides the per-port object transport used between nodes.
//!
//! # Architecture
//!
//! - **Transport**: TCP, one connection per payload (connect, write one
//!   frame, close)
//! - **Codec**: JSON serialization of any serde type
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//!
//! # Components
//!
//! - **[`JsonCodec`]**: Encode/decode payloads to JSON
//! - **[`TcpTransport`]**: Framed reads/writes with explicit deadlines
//! - **[`Sender`]**: Outbound queue for one port, at most one connection per
//!   destination at a time
//! - **[`Receiver`]**: Listener for one port, publishes decoded payloads to a
//!   FIFO that is polled with a bounded wait

pub mod codec;
pub mod receiver;
pub mod sender;
pub mod tcp;

pub use codec::JsonCodec;
pub use receiver::Receiver;
pub use sender::{DeliveryFailure, Sender};
pub use tcp::TcpTransport;

use std::time::Duration;

#[cfg(test)]
mod tests;

/// Default number of concurrent workers per transport pool
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default bounded wait for queue polling
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Default deadline for each connect/read/write
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Tuning shared by senders, receivers and the processing pipeline.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum number of sends/reads/tasks running at once per component
    pub pool_size: usize,
    /// How long a `poll()` waits before reporting that nothing arrived
    pub poll_timeout: Duration,
    /// Deadline applied to every socket connect, read and write
    pub io_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl TransportConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }
}
