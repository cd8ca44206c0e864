//! WordTree Common Types and Transport
//!
//! This crate provides the payload definitions and the TCP object transport
//! shared by every WordTree node.
//!
//! # Overview
//!
//! WordTree distributes word-counting jobs over a tree of peer nodes. Nodes
//! talk to each other exclusively by pushing single payloads over short-lived
//! TCP connections:
//!
//! - **Protocol Layer**: the two payload shapes (node address, word batch) and
//!   the shared error type
//! - **Transport Layer**: framing, the per-port [`Sender`](transport::Sender)
//!   and [`Receiver`](transport::Receiver)
//!
//! # Wire Format
//!
//! - **Transport**: TCP, one payload per connection
//! - **Serialization**: JSON
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Max Message Size**: 100 MB
//!
//! # Example
//!
//! ```no_run
//! use std::net::{IpAddr, Ipv4Addr, SocketAddr};
//! use wordtree_common::{Payload, TransportConfig};
//! use wordtree_common::transport::{Receiver, Sender};
//!
//! # #[tokio::main]
//! # async fn main() -> wordtree_common::Result<()> {
//! let config = TransportConfig::default();
//! let local = IpAddr::V4(Ipv4Addr::LOCALHOST);
//!
//! let receiver = Receiver::<Payload>::bind(SocketAddr::new(local, 0), &config)?;
//! let sender = Sender::spawn(receiver.local_addr().port(), &config);
//!
//! sender.send(&Payload::batch(["hello", "world"]), local)?;
//! let received = receiver.poll().await;
//! # Ok(())
//! # }
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
pub use transport::TransportConfig;
