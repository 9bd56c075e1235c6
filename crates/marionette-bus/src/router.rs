//! Topic-routed handler dispatch

use bytes::Bytes;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{BusError, Result};
use crate::transport::{Inbox, InboundMessage};

/// Future returned by a [`Handler`]
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Async callback invoked with `(topic, payload)` for each matching message
pub type Handler = Arc<dyn Fn(String, Bytes) -> HandlerFuture + Send + Sync>;

/// Box an async closure into a [`Handler`]
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(String, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |topic, payload| f(topic, payload).boxed())
}

/// Maps exact topics to handlers, kept in registration order
#[derive(Default)]
pub struct CallbackRouter {
    handlers: DashMap<String, Vec<Handler>>,
}

impl CallbackRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. Registering the same topic twice runs both handlers.
    pub fn register(&self, topic: &str, handler: Handler) {
        self.handlers
            .entry(topic.to_string())
            .or_insert_with(Vec::new)
            .push(handler);
    }

    /// Snapshot of the handlers for `topic`
    pub fn handlers_for(&self, topic: &str) -> Vec<Handler> {
        self.handlers
            .get(topic)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.handlers.get(topic).map(|e| e.len()).unwrap_or(0)
    }

    pub fn topic_count(&self) -> usize {
        self.handlers.len()
    }

    /// Run every handler for one message, in registration order.
    ///
    /// The handler list is cloned first, so handlers may register new
    /// subscriptions without deadlocking. Returns the number of handlers run.
    pub async fn dispatch(&self, message: InboundMessage, ignore_errors: bool) -> Result<usize> {
        let handlers = self.handlers_for(&message.topic);
        if handlers.is_empty() {
            debug!("No handlers for '{}', dropping message", message.topic);
            return Ok(0);
        }

        for h in &handlers {
            if let Err(e) = h(message.topic.clone(), message.payload.clone()).await {
                if ignore_errors {
                    error!("Error in handler for topic '{}': {:#}", message.topic, e);
                } else {
                    return Err(BusError::Handler {
                        topic: message.topic,
                        source: e.into(),
                    });
                }
            }
        }

        Ok(handlers.len())
    }

    /// Dispatch the messages queued in `inbox` when the drain starts.
    ///
    /// Each message is popped before its handlers run. Anything queued while
    /// the handlers execute waits for the next drain. On an aborting error the
    /// remaining messages stay queued. Returns the number of messages popped.
    pub async fn drain(&self, inbox: &Inbox, ignore_errors: bool) -> Result<usize> {
        let pending = inbox.len();
        let mut processed = 0;

        for _ in 0..pending {
            let Some(message) = inbox.pop() else {
                break;
            };
            processed += 1;
            self.dispatch(message, ignore_errors).await?;
        }

        Ok(processed)
    }
}
