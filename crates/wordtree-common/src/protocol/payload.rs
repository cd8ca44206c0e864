//! WordTree Payload Types
//!
//! This module defines the values that travel between nodes.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A single payload exchanged between two nodes.
///
/// Exactly one payload is carried per TCP connection. There is no
/// application-level tag on the wire: an address is encoded as a JSON string
/// (`"10.0.0.7"`) and a batch as a JSON array of strings (`["a", "b"]`), and
/// the receiving side tells them apart by shape alone.
///
/// # Shapes
///
/// - `Address`: membership control. A joining worker announces itself with
///   its own address, a coordinator confirms with its own address, and a
///   full coordinator redirects a joiner by sending the address of the
///   subordinate it should join instead.
/// - `Batch`: an ordered fragment of a word-counting job.
///
/// # Example
///
/// ```
/// use wordtree_common::protocol::Payload;
///
/// let address: Payload = serde_json::from_str("\"10.0.0.7\"").unwrap();
/// assert!(address.as_address().is_some());
///
/// let batch: Payload = serde_json::from_str("[\"a\", \"b\"]").unwrap();
/// assert_eq!(batch.as_batch().map(|w| w.len()), Some(2));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Payload {
    /// A node address (handshake / redirect)
    Address(IpAddr),
    /// An ordered sequence of words (job fragment)
    Batch(Vec<String>),
}

impl Payload {
    /// Creates a batch payload from anything yielding string-like words.
    pub fn batch<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Payload::Batch(words.into_iter().map(Into::into).collect())
    }

    /// The address carried by a handshake payload, `None` for a batch.
    pub fn as_address(&self) -> Option<IpAddr> {
        match self {
            Payload::Address(addr) => Some(*addr),
            Payload::Batch(_) => None,
        }
    }

    /// The words carried by a job payload, `None` for an address.
    pub fn as_batch(&self) -> Option<&[String]> {
        match self {
            Payload::Batch(words) => Some(words),
            Payload::Address(_) => None,
        }
    }

    /// Short human-readable description used in log lines.
    pub fn describe(&self) -> String {
        match self {
            Payload::Address(addr) => format!("address {}", addr),
            Payload::Batch(words) => format!("batch of {} words", words.len()),
        }
    }
}

impl From<IpAddr> for Payload {
    fn from(addr: IpAddr) -> Self {
        Payload::Address(addr)
    }
}

impl From<Vec<String>> for Payload {
    fn from(words: Vec<String>) -> Self {
        Payload::Batch(words)
    }
}
