//! Buffered publish/subscribe client

use bytes::Bytes;
use marionette_core::QoS;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::LastWill;
use crate::error::{BusError, Result};
use crate::router::{handler, CallbackRouter, Handler};
use crate::transport::{BusTransport, Inbox};

/// Default interval between polls of the inbound queue
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Publish/subscribe client that buffers inbound messages until polled.
///
/// The transport pushes received messages into an [`Inbox`]; handlers only
/// run from [`poll`](Self::poll), never on the transport's receive path.
pub struct PubSubClient {
    transport: Arc<dyn BusTransport>,
    last_will: Option<LastWill>,
    router: CallbackRouter,
    inbox: Inbox,
    /// Serializes drains so FIFO order holds across concurrent pollers
    poll_lock: tokio::sync::Mutex<()>,
    poll_task: Mutex<Option<PollTask>>,
}

impl PubSubClient {
    pub fn new(transport: Arc<dyn BusTransport>) -> Self {
        Self {
            transport,
            last_will: None,
            router: CallbackRouter::new(),
            inbox: Inbox::new(),
            poll_lock: tokio::sync::Mutex::new(()),
            poll_task: Mutex::new(None),
        }
    }

    /// Register a last-will message, sent to the broker on `connect`
    pub fn with_last_will(mut self, will: LastWill) -> Self {
        self.last_will = Some(will);
        self
    }

    /// Client over MQTT, using the config's last-will if any
    #[cfg(feature = "mqtt")]
    pub fn mqtt(config: crate::BusConfig) -> Self {
        let will = config.last_will.clone();
        let mut client = Self::new(Arc::new(crate::mqtt::MqttTransport::new(config)));
        client.last_will = will;
        client
    }

    /// Establish the bus connection. Not retried on failure.
    pub async fn connect(&self) -> Result<()> {
        info!("Bus connecting");
        self.transport
            .connect(self.inbox.clone(), self.last_will.clone())
            .await?;
        info!("Bus connected");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Fire-and-forget publish
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Result<()> {
        let payload = payload.into();
        debug!("Publishing to '{}' ({} bytes)", topic, payload.len());
        self.transport.publish(topic, payload, qos, retain).await
    }

    /// Register an async callback for `topic` and subscribe on the transport.
    ///
    /// Not idempotent: subscribing twice appends a second handler, and both run.
    pub async fn subscribe<F, Fut>(&self, topic: &str, callback: F, qos: QoS) -> Result<()>
    where
        F: Fn(String, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subscribe_handler(topic, handler(callback), qos).await
    }

    pub async fn subscribe_handler(&self, topic: &str, handler: Handler, qos: QoS) -> Result<()> {
        info!("Subscribing to '{}'", topic);
        self.router.register(topic, handler);
        self.transport.subscribe(topic, qos).await
    }

    /// Dispatch every message queued when the poll starts.
    ///
    /// With `ignore_errors` a failing handler is logged and dispatch continues;
    /// without it the first failure aborts the poll and is returned. Returns
    /// the number of messages taken off the queue.
    pub async fn poll(&self, ignore_errors: bool) -> Result<usize> {
        let _guard = self.poll_lock.lock().await;
        self.router.drain(&self.inbox, ignore_errors).await
    }

    /// Spawn a task that polls every `interval` until stopped
    pub fn start(self: &Arc<Self>, interval: Duration, ignore_errors: bool) -> Result<CancellationToken> {
        self.start_with_token(interval, ignore_errors, CancellationToken::new())
    }

    /// Like [`start`](Self::start), stopping when `cancel` is cancelled
    pub fn start_with_token(
        self: &Arc<Self>,
        interval: Duration,
        ignore_errors: bool,
        cancel: CancellationToken,
    ) -> Result<CancellationToken> {
        let mut slot = self.poll_task.lock();
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                return Err(BusError::AlreadyRunning);
            }
        }

        let client = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            info!("Bus poll loop started ({:?} interval)", interval);
            while !token.is_cancelled() {
                if let Err(e) = client.poll(ignore_errors).await {
                    error!("Bus poll aborted: {}", e);
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            info!("Bus poll loop stopped");
        });

        *slot = Some(PollTask {
            cancel: cancel.clone(),
            handle,
        });
        Ok(cancel)
    }

    /// Cancel the poll loop and wait for it to exit
    pub async fn stop(&self) {
        let task = self.poll_task.lock().take();
        if let Some(task) = task {
            task.cancel.cancel();
            let _ = task.handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.poll_task
            .lock()
            .as_ref()
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }

    /// Messages waiting for the next poll
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    pub fn router(&self) -> &CallbackRouter {
        &self.router
    }
}
