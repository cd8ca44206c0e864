//! Transport Integration Tests
//!
//! End-to-end tests of the public transport API over loopback:
//! 1. Every accepted payload is delivered exactly once
//! 2. Concurrent pollers never observe the same payload twice
//! 3. Unreachable destinations are reported, not retried
//! 4. Shutdown is terminal for both ends

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use wordtree_common::transport::{Receiver, Sender};
use wordtree_common::{Payload, TransportConfig, WordTreeError};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn test_config() -> TransportConfig {
    TransportConfig::default()
        .with_poll_timeout(Duration::from_millis(100))
        .with_io_timeout(Duration::from_secs(2))
}

fn bind_receiver(config: &TransportConfig) -> Arc<Receiver<Payload>> {
    Arc::new(Receiver::bind(SocketAddr::new(LOCALHOST, 0), config).unwrap())
}

/// Polls until `expected` payloads arrived or nothing shows up for a while.
async fn drain(receiver: &Receiver<Payload>, expected: usize) -> Vec<Payload> {
    let mut received = Vec::new();
    let mut idle_polls = 0;
    while received.len() < expected && idle_polls < 30 {
        match receiver.poll().await {
            Some(payload) => {
                idle_polls = 0;
                received.push(payload);
            }
            None => idle_polls += 1,
        }
    }
    received
}

// ============================================================================
// Test 1: Exactly-once delivery
// ============================================================================

#[tokio::test]
async fn test_many_payloads_arrive_exactly_once() {
    let config = test_config();
    let receiver = bind_receiver(&config);
    let sender = Sender::spawn(receiver.local_addr().port(), &config);

    for i in 0..40 {
        sender.send(&Payload::batch([format!("word-{}", i)]), LOCALHOST).unwrap();
    }

    let received = drain(&receiver, 40).await;
    assert_eq!(received.len(), 40);

    let distinct: HashSet<String> = received
        .iter()
        .filter_map(|p| p.as_batch())
        .map(|words| words[0].clone())
        .collect();
    assert_eq!(distinct.len(), 40);

    // Nothing extra trails behind
    assert!(receiver.poll().await.is_none());

    sender.shutdown().await;
    receiver.shutdown().await;
}

#[tokio::test]
async fn test_several_senders_share_one_receiver() {
    let config = test_config();
    let receiver = bind_receiver(&config);
    let port = receiver.local_addr().port();

    let senders: Vec<Sender> = (0..3).map(|_| Sender::spawn(port, &config)).collect();
    for (n, sender) in senders.iter().enumerate() {
        for i in 0..5 {
            sender.send(&Payload::batch([format!("s{}-{}", n, i)]), LOCALHOST).unwrap();
        }
    }

    let received = drain(&receiver, 15).await;
    assert_eq!(received.len(), 15);

    join_all(senders.iter().map(|s| s.shutdown())).await;
    receiver.shutdown().await;
}

// ============================================================================
// Test 2: Concurrent pollers
// ============================================================================

#[tokio::test]
async fn test_concurrent_pollers_split_the_queue() {
    let config = test_config();
    let receiver = bind_receiver(&config);
    let sender = Sender::spawn(receiver.local_addr().port(), &config);

    for i in 0..20 {
        sender.send(&Payload::batch([i.to_string()]), LOCALHOST).unwrap();
    }
    sender.shutdown().await;

    let pollers = (0..4).map(|_| {
        let receiver = Arc::clone(&receiver);
        tokio::spawn(async move {
            let mut seen = Vec::new();
            let mut idle_polls = 0;
            while idle_polls < 5 {
                match receiver.poll().await {
                    Some(payload) => seen.push(payload),
                    None => idle_polls += 1,
                }
            }
            seen
        })
    });

    let mut all = Vec::new();
    for seen in join_all(pollers).await {
        all.extend(seen.unwrap());
    }

    let distinct: HashSet<String> = all
        .iter()
        .filter_map(|p| p.as_batch())
        .map(|words| words[0].clone())
        .collect();
    assert_eq!(all.len(), 20);
    assert_eq!(distinct.len(), 20);

    receiver.shutdown().await;
}

// ============================================================================
// Test 3: Failure reporting
// ============================================================================

#[tokio::test]
async fn test_unreachable_destination_is_reported_once_per_send() {
    let probe = std::net::TcpListener::bind((LOCALHOST, 0)).unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
    let sender = Sender::spawn_with_failure_reports(port, &test_config(), failures_tx);

    sender.send(&Payload::Address(LOCALHOST), LOCALHOST).unwrap();
    sender.shutdown().await;

    let failure = failures_rx.recv().await.unwrap();
    assert_eq!(failure.destination, LOCALHOST);
    assert!(!failure.reason.is_empty());

    // No retry: the dispatcher is gone and nothing else was reported
    assert!(failures_rx.recv().await.is_none());
}

// ============================================================================
// Test 4: Shutdown is terminal
// ============================================================================

#[tokio::test]
async fn test_shutdown_is_terminal() {
    let config = test_config();
    let receiver = bind_receiver(&config);
    let addr = receiver.local_addr();
    let sender = Sender::spawn(addr.port(), &config);

    sender.shutdown().await;
    receiver.shutdown().await;

    assert!(matches!(
        sender.send(&Payload::Address(LOCALHOST), LOCALHOST),
        Err(WordTreeError::Shutdown(_))
    ));

    // The port is free again
    let rebound = Receiver::<Payload>::bind(addr, &config).unwrap();
    rebound.shutdown().await;
}
