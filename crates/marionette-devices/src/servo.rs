//! Servo channel

use marionette_bus::PubSubClient;
use marionette_core::{payload, DeviceTopics, Fraction};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::channel::{bind, parse_or_drop, DEVICE_QOS};
use crate::driver::ServoDriver;
use crate::error::Result;

struct ServoState {
    driver: Box<dyn ServoDriver>,
    position: Fraction,
}

/// A servo kept in sync with `<root>/write` and `<root>/read`
pub struct ServoChannel {
    topics: DeviceTopics,
    bus: Arc<PubSubClient>,
    state: Mutex<ServoState>,
    /// Held from the state update through its broadcast
    publishing: tokio::sync::Mutex<()>,
}

impl ServoChannel {
    /// Create the channel and subscribe it to `<root>/write`.
    ///
    /// The cached position starts at 0.0; the driver is not touched until the
    /// first write.
    pub async fn attach(
        driver: impl ServoDriver + 'static,
        bus: Arc<PubSubClient>,
        root: &str,
    ) -> Result<Arc<Self>> {
        let channel = Arc::new(Self {
            topics: DeviceTopics::new(root),
            bus: bus.clone(),
            state: Mutex::new(ServoState {
                driver: Box::new(driver),
                position: Fraction::MIN,
            }),
            publishing: tokio::sync::Mutex::new(()),
        });

        let topic = channel.topics.write();
        bind(&bus, &topic, &channel, |servo: Arc<Self>, bytes| async move {
            servo.on_write_payload(&bytes).await
        })
        .await?;

        info!("Servo channel on '{}'", channel.topics.root());
        Ok(channel)
    }

    pub fn topics(&self) -> &DeviceTopics {
        &self.topics
    }

    /// Move the servo. Returns whether the cached position changed.
    ///
    /// Values outside 0.0..=1.0 fail validation and leave the cache alone.
    /// `<root>/read` is published only when the position changed. Concurrent
    /// writes broadcast in the order they updated the cache.
    pub async fn write(&self, value: f32) -> Result<bool> {
        self.move_to(Fraction::new(value)?).await
    }

    /// Move the servo to an already validated position
    pub async fn move_to(&self, position: Fraction) -> Result<bool> {
        let _order = self.publishing.lock().await;
        let changed = {
            let mut state = self.state.lock();
            state.driver.write_fraction(position)?;
            let changed = state.position != position;
            state.position = position;
            changed
        };

        if changed {
            debug!("{} -> {}", self.topics.root(), position);
            self.bus
                .publish(
                    &self.topics.read(),
                    payload::servo_state(position.get()),
                    DEVICE_QOS,
                    false,
                )
                .await?;
        }
        Ok(changed)
    }

    /// Cached position; the device is not queried
    pub fn read(&self) -> f32 {
        self.state.lock().position.get()
    }

    async fn on_write_payload(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let topic = self.topics.write();
        if let Some(value) = parse_or_drop(&topic, bytes, payload::parse_servo_write) {
            self.move_to(Fraction::from_f64(value)?).await?;
        }
        Ok(())
    }
}
