//! PubSubClient tests
//!
//! Exercises the client against the in-process transport:
//! - Connect, last-will registration and refused connections
//! - FIFO dispatch and per-topic handler order
//! - Error isolation with and without `ignore_errors`
//! - Messages published by handlers wait for the next poll
//! - Background poll loop start/stop

use bytes::Bytes;
use marionette_bus::{BusError, LastWill, MemoryTransport, PubSubClient};
use marionette_core::QoS;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

type CallLog = Arc<Mutex<Vec<String>>>;

async fn connected_client() -> (Arc<MemoryTransport>, Arc<PubSubClient>) {
    let transport = Arc::new(MemoryTransport::new());
    let client = Arc::new(PubSubClient::new(transport.clone()));
    client.connect().await.expect("connect");
    (transport, client)
}

async fn subscribe_recorder(client: &PubSubClient, topic: &str, name: &'static str, log: &CallLog) {
    let log = log.clone();
    client
        .subscribe(
            topic,
            move |topic, payload| {
                let log = log.clone();
                async move {
                    let body = String::from_utf8_lossy(&payload).to_string();
                    log.lock().push(format!("{}({}:{})", name, topic, body));
                    Ok(())
                }
            },
            QoS::AtMostOnce,
        )
        .await
        .expect("subscribe");
}

async fn wait_for_count(counter: &AtomicU32, target: u32, max_wait: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if counter.load(Ordering::SeqCst) >= target {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

// ============================================================================
// Connection
// ============================================================================

#[tokio::test]
async fn test_connect_registers_last_will() {
    let transport = Arc::new(MemoryTransport::new());
    let will = LastWill::new("puppet/status", "offline", true);
    let client = PubSubClient::new(transport.clone()).with_last_will(will.clone());

    assert!(!client.is_connected());
    client.connect().await.unwrap();
    assert!(client.is_connected());
    assert_eq!(transport.last_will(), Some(will));
}

#[tokio::test]
async fn test_refused_connection_is_reported() {
    let client = PubSubClient::new(Arc::new(MemoryTransport::refusing()));
    let result = client.connect().await;
    assert!(matches!(result, Err(BusError::ConnectionFailed(_))));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_publish_reaches_transport() {
    let (transport, client) = connected_client().await;
    client
        .publish("puppet/eyes/read", &b"{}"[..], QoS::AtLeastOnce, true)
        .await
        .unwrap();

    let published = transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "puppet/eyes/read");
    assert_eq!(published[0].qos, QoS::AtLeastOnce);
    assert!(published[0].retain);
}

// ============================================================================
// Dispatch order
// ============================================================================

#[tokio::test]
async fn test_fifo_then_subscription_order() {
    let (transport, client) = connected_client().await;
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));

    subscribe_recorder(&client, "A", "h1", &log).await;
    subscribe_recorder(&client, "A", "h2", &log).await;
    subscribe_recorder(&client, "B", "h3", &log).await;

    transport.inject("A", "m1").unwrap();
    transport.inject("B", "m2").unwrap();

    assert_eq!(client.poll(true).await.unwrap(), 2);
    assert_eq!(*log.lock(), vec!["h1(A:m1)", "h2(A:m1)", "h3(B:m2)"]);
}

#[tokio::test]
async fn test_duplicate_subscribe_runs_both_handlers() {
    let (transport, client) = connected_client().await;
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));

    subscribe_recorder(&client, "A", "first", &log).await;
    subscribe_recorder(&client, "A", "second", &log).await;

    // One transport subscribe request per call
    assert_eq!(transport.subscriptions().len(), 2);
    assert_eq!(client.router().handler_count("A"), 2);

    transport.inject("A", "x").unwrap();
    client.poll(true).await.unwrap();
    assert_eq!(log.lock().len(), 2);
}

#[tokio::test]
async fn test_unregistered_topic_is_dropped_silently() {
    let (transport, client) = connected_client().await;
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    subscribe_recorder(&client, "A", "h", &log).await;

    transport.inject("nobody/listens", "x").unwrap();
    transport.inject("A", "y").unwrap();

    assert_eq!(client.poll(false).await.unwrap(), 2);
    assert_eq!(*log.lock(), vec!["h(A:y)"]);
    assert_eq!(client.pending(), 0);
}

#[tokio::test]
async fn test_handler_publish_waits_for_next_poll() {
    let transport = Arc::new(MemoryTransport::with_loopback());
    let client = Arc::new(PubSubClient::new(transport.clone()));
    client.connect().await.unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();
    let weak = Arc::downgrade(&client);
    client
        .subscribe(
            "echo",
            move |topic, payload| {
                let calls = calls_clone.clone();
                let weak = weak.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if let Some(client) = weak.upgrade() {
                        client.publish(&topic, payload, QoS::AtMostOnce, false).await?;
                    }
                    Ok(())
                }
            },
            QoS::AtMostOnce,
        )
        .await
        .unwrap();

    transport.inject("echo", "ping").unwrap();

    // Each poll handles exactly one generation of the self-publishing loop
    assert_eq!(client.poll(true).await.unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.pending(), 1);

    assert_eq!(client.poll(true).await.unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(client.pending(), 1);
}

// ============================================================================
// Error isolation
// ============================================================================

async fn subscribe_failing(client: &PubSubClient, topic: &str) {
    client
        .subscribe(
            topic,
            |_topic, _payload| async move { Err(anyhow::anyhow!("handler exploded")) },
            QoS::AtMostOnce,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_ignore_errors_keeps_processing() {
    let (transport, client) = connected_client().await;
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));

    subscribe_failing(&client, "bad").await;
    subscribe_recorder(&client, "bad", "after", &log).await;
    subscribe_recorder(&client, "good", "good", &log).await;

    transport.inject("bad", "1").unwrap();
    transport.inject("good", "2").unwrap();

    assert_eq!(client.poll(true).await.unwrap(), 2);
    assert_eq!(*log.lock(), vec!["after(bad:1)", "good(good:2)"]);
}

#[tokio::test]
async fn test_error_aborts_poll_without_ignore() {
    let (transport, client) = connected_client().await;
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));

    subscribe_failing(&client, "bad").await;
    subscribe_recorder(&client, "good", "good", &log).await;

    transport.inject("bad", "1").unwrap();
    transport.inject("good", "2").unwrap();

    let result = client.poll(false).await;
    match result {
        Err(BusError::Handler { topic, .. }) => assert_eq!(topic, "bad"),
        other => panic!("expected handler error, got {:?}", other),
    }
    assert!(log.lock().is_empty());

    // The failed message was consumed; the rest is still queued
    assert_eq!(client.pending(), 1);
    assert_eq!(client.poll(false).await.unwrap(), 1);
    assert_eq!(*log.lock(), vec!["good(good:2)"]);
}

// ============================================================================
// Poll loop
// ============================================================================

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let (_transport, client) = connected_client().await;

    client.start(Duration::from_millis(10), true).unwrap();
    assert!(client.is_running());
    assert!(matches!(
        client.start(Duration::from_millis(10), true),
        Err(BusError::AlreadyRunning)
    ));

    client.stop().await;
    assert!(!client.is_running());
    client.start(Duration::from_millis(10), true).unwrap();
    client.stop().await;
}

#[tokio::test]
async fn test_poll_loop_dispatches_in_background() {
    let (transport, client) = connected_client().await;
    let count = Arc::new(AtomicU32::new(0));
    let count_clone = count.clone();
    client
        .subscribe(
            "tick",
            move |_topic, _payload: Bytes| {
                let count = count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            QoS::AtMostOnce,
        )
        .await
        .unwrap();

    let cancel = client.start(Duration::from_millis(5), true).unwrap();
    transport.inject("tick", "1").unwrap();
    transport.inject("tick", "2").unwrap();

    assert!(wait_for_count(&count, 2, Duration::from_secs(2)).await);

    cancel.cancel();
    let start = Instant::now();
    while client.is_running() && start.elapsed() < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!client.is_running());
}
