//! Bus transport trait and the inbound message queue

use async_trait::async_trait;
use bytes::Bytes;
use marionette_core::QoS;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::LastWill;
use crate::error::Result;

/// A message received from the bus, waiting for dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Unbounded FIFO between a transport's receive path and the poll loop.
///
/// Transports only ever `push`; handlers never run on the receive path.
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    queue: Arc<Mutex<VecDeque<InboundMessage>>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Never blocks on dispatch.
    pub fn push(&self, topic: impl Into<String>, payload: impl Into<Bytes>) {
        self.queue.lock().push_back(InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub(crate) fn pop(&self) -> Option<InboundMessage> {
        self.queue.lock().pop_front()
    }
}

/// Black-box publish/subscribe connection
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Open the connection. Every message received afterwards goes to `inbox`.
    async fn connect(&self, inbox: Inbox, will: Option<LastWill>) -> Result<()>;

    /// Send a message; delivery guarantees are those of `qos`
    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS, retain: bool) -> Result<()>;

    /// Ask the broker for messages on `topic`
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<()>;

    fn is_connected(&self) -> bool;
}
