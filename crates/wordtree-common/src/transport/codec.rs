use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::Result;

/// JSON codec for encoding/decoding transported values
///
/// The transport itself is payload-agnostic: anything that implements
/// `Serialize` can be sent and anything that implements `DeserializeOwned`
/// can be received.
///
/// # Example
///
/// ```
/// use wordtree_common::transport::JsonCodec;
/// use wordtree_common::protocol::Payload;
///
/// let payload = Payload::batch(["to", "be", "or", "not"]);
/// let encoded = JsonCodec::encode(&payload).unwrap();
/// let decoded: Payload = JsonCodec::decode(&encoded).unwrap();
/// assert_eq!(payload, decoded);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    /// Encode any serializable value to bytes
    ///
    /// # Errors
    ///
    /// Returns `JsonSerialization` if `value` cannot be represented as JSON
    /// (for instance a map with non-string keys).
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode a value from JSON bytes
    ///
    /// # Errors
    ///
    /// Returns `JsonSerialization` if `data` is not JSON or does not have
    /// the shape of `T`.
    pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Payload;
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_payload_address_round_trip() {
        let payload = Payload::Address(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)));

        let encoded = JsonCodec::encode(&payload).unwrap();
        let decoded: Payload = JsonCodec::decode(&encoded).unwrap();

        assert_eq!(payload, decoded);
    }

    #[test]
    fn test_arbitrary_serde_types() {
        let mut counts = HashMap::new();
        counts.insert("word".to_string(), 3usize);

        let encoded = JsonCodec::encode(&counts).unwrap();
        let decoded: HashMap<String, usize> = JsonCodec::decode(&encoded).unwrap();

        assert_eq!(decoded.get("word"), Some(&3));
    }

    #[test]
    fn test_invalid_data_returns_error() {
        let invalid_data = vec![0xFF, 0xFF, 0xFF, 0xFF];
        assert!(JsonCodec::decode::<Payload>(&invalid_data).is_err());
    }
}
