//! In-process bus transport
//!
//! Records every publish and subscribe request and lets callers inject
//! inbound messages. With loopback enabled it behaves like a broker with a
//! single client: publishes to a subscribed topic come back through the inbox.

use async_trait::async_trait;
use bytes::Bytes;
use marionette_core::QoS;
use parking_lot::Mutex;

use crate::config::LastWill;
use crate::error::{BusError, Result};
use crate::transport::{BusTransport, Inbox};

/// A publish recorded by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Default)]
pub struct MemoryTransport {
    inbox: Mutex<Option<Inbox>>,
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<(String, QoS)>>,
    will: Mutex<Option<LastWill>>,
    loopback: bool,
    refuse_connect: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver publishes on subscribed topics back to this client
    pub fn with_loopback() -> Self {
        Self {
            loopback: true,
            ..Self::default()
        }
    }

    /// A transport whose `connect` always fails
    pub fn refusing() -> Self {
        Self {
            refuse_connect: true,
            ..Self::default()
        }
    }

    /// Simulate a message arriving from the broker
    pub fn inject(&self, topic: &str, payload: impl Into<Bytes>) -> Result<()> {
        let inbox = self.inbox.lock().clone().ok_or(BusError::NotConnected)?;
        inbox.push(topic, payload);
        Ok(())
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    /// Payloads published to `topic`, oldest first
    pub fn published_to(&self, topic: &str) -> Vec<Bytes> {
        self.published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    pub fn clear_published(&self) {
        self.published.lock().clear();
    }

    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.subscriptions.lock().clone()
    }

    pub fn last_will(&self) -> Option<LastWill> {
        self.will.lock().clone()
    }
}

#[async_trait]
impl BusTransport for MemoryTransport {
    async fn connect(&self, inbox: Inbox, will: Option<LastWill>) -> Result<()> {
        if self.refuse_connect {
            return Err(BusError::ConnectionFailed("connection refused".to_string()));
        }
        let mut slot = self.inbox.lock();
        if slot.is_some() {
            return Err(BusError::AlreadyConnected);
        }
        *slot = Some(inbox);
        *self.will.lock() = will;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS, retain: bool) -> Result<()> {
        let inbox = self.inbox.lock().clone().ok_or(BusError::NotConnected)?;
        self.published.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.clone(),
            qos,
            retain,
        });

        if self.loopback && self.subscriptions.lock().iter().any(|(t, _)| t == topic) {
            inbox.push(topic, payload);
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        self.subscriptions.lock().push((topic.to_string(), qos));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inbox.lock().is_some()
    }
}
