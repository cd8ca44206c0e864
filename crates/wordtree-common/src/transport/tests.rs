//! Tests for the sender/receiver pair
//!
//! These tests wire a [`Sender`] to a [`Receiver`] over loopback and check
//! what a node relies on: payloads arrive intact, arbitrary serde types can
//! travel, and the defaults match the documented values.

#[cfg(test)]
mod tests {
    use crate::protocol::Payload;
    use crate::transport::{Receiver, Sender, TransportConfig};
    use crate::transport::{DEFAULT_IO_TIMEOUT, DEFAULT_POLL_TIMEOUT, DEFAULT_POOL_SIZE};
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn test_config() -> TransportConfig {
        TransportConfig::default()
            .with_poll_timeout(Duration::from_millis(100))
            .with_io_timeout(Duration::from_secs(2))
    }

    async fn poll_some<T>(receiver: &Receiver<T>) -> T
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        for _ in 0..50 {
            if let Some(value) = receiver.poll().await {
                return value;
            }
        }
        panic!("nothing received");
    }

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.poll_timeout, DEFAULT_POLL_TIMEOUT);
        assert_eq!(config.io_timeout, DEFAULT_IO_TIMEOUT);
        assert_eq!(DEFAULT_POOL_SIZE, 10);
        assert_eq!(DEFAULT_POLL_TIMEOUT, Duration::from_millis(500));
    }

    #[test]
    fn test_config_builders() {
        let config = TransportConfig::default()
            .with_pool_size(3)
            .with_poll_timeout(Duration::from_millis(20))
            .with_io_timeout(Duration::from_secs(1));

        assert_eq!(config.pool_size, 3);
        assert_eq!(config.poll_timeout, Duration::from_millis(20));
        assert_eq!(config.io_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_sender_to_receiver_address_and_batch() {
        let config = test_config();
        let receiver = Receiver::<Payload>::bind(SocketAddr::new(LOCALHOST, 0), &config).unwrap();
        let sender = Sender::spawn(receiver.local_addr().port(), &config);

        sender.send(&Payload::Address(LOCALHOST), LOCALHOST).unwrap();
        assert_eq!(poll_some(&receiver).await, Payload::Address(LOCALHOST));

        sender.send(&Payload::batch(["x", "y", "x"]), LOCALHOST).unwrap();
        assert_eq!(poll_some(&receiver).await, Payload::batch(["x", "y", "x"]));

        sender.shutdown().await;
        receiver.shutdown().await;
    }

    #[tokio::test]
    async fn test_transport_carries_any_serde_type() {
        let config = test_config();
        let receiver =
            Receiver::<HashMap<String, usize>>::bind(SocketAddr::new(LOCALHOST, 0), &config).unwrap();
        let sender = Sender::spawn(receiver.local_addr().port(), &config);

        let mut counts = HashMap::new();
        counts.insert("be".to_string(), 2usize);
        counts.insert("to".to_string(), 2usize);
        sender.send(&counts, LOCALHOST).unwrap();

        assert_eq!(poll_some(&receiver).await, counts);

        sender.shutdown().await;
        receiver.shutdown().await;
    }

    #[tokio::test]
    async fn test_receiver_of_wrong_type_drops_payload() {
        let config = test_config();
        let receiver = Receiver::<Vec<u32>>::bind(SocketAddr::new(LOCALHOST, 0), &config).unwrap();
        let sender = Sender::spawn(receiver.local_addr().port(), &config);

        sender.send(&Payload::batch(["not", "numbers"]), LOCALHOST).unwrap();
        sender.send(&vec![1u32, 2, 3], LOCALHOST).unwrap();

        assert_eq!(poll_some(&receiver).await, vec![1, 2, 3]);
        assert!(receiver.poll().await.is_none());

        sender.shutdown().await;
        receiver.shutdown().await;
    }
}
