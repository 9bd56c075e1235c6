//! RGB LED channel

use marionette_bus::PubSubClient;
use marionette_core::payload::{self, ColorPatch};
use marionette_core::{Color, DeviceTopics};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::channel::{bind, parse_or_drop, DEVICE_QOS};
use crate::driver::RgbDriver;
use crate::error::Result;

struct LedState {
    driver: Box<dyn RgbDriver>,
    color: Color,
}

/// An RGB LED kept in sync with `<root>/write` and `<root>/read`
pub struct LedChannel {
    topics: DeviceTopics,
    bus: Arc<PubSubClient>,
    state: Mutex<LedState>,
    publishing: tokio::sync::Mutex<()>,
}

impl LedChannel {
    pub async fn attach(
        driver: impl RgbDriver + 'static,
        bus: Arc<PubSubClient>,
        root: &str,
    ) -> Result<Arc<Self>> {
        let channel = Arc::new(Self {
            topics: DeviceTopics::new(root),
            bus: bus.clone(),
            state: Mutex::new(LedState {
                driver: Box::new(driver),
                color: Color::OFF,
            }),
            publishing: tokio::sync::Mutex::new(()),
        });

        let topic = channel.topics.write();
        bind(&bus, &topic, &channel, |led: Arc<Self>, bytes| async move {
            led.on_write_payload(&bytes).await
        })
        .await?;

        info!("LED channel on '{}'", channel.topics.root());
        Ok(channel)
    }

    pub fn topics(&self) -> &DeviceTopics {
        &self.topics
    }

    /// Show `color`. Returns whether the cached color changed.
    pub async fn write(&self, color: Color) -> Result<bool> {
        self.update(|_| color).await
    }

    /// Apply a partial update; absent channels keep their cached value
    pub async fn patch(&self, patch: ColorPatch) -> Result<bool> {
        self.update(|current| patch.apply(current)).await
    }

    pub fn read(&self) -> Color {
        self.state.lock().color
    }

    async fn update(&self, next: impl FnOnce(Color) -> Color) -> Result<bool> {
        let _order = self.publishing.lock().await;
        let (changed, color) = {
            let mut state = self.state.lock();
            let color = next(state.color);
            state.driver.set_color(color)?;
            let changed = state.color != color;
            state.color = color;
            (changed, color)
        };

        if changed {
            debug!(
                "{} -> ({}, {}, {})",
                self.topics.root(),
                color.r,
                color.g,
                color.b
            );
            self.bus
                .publish(
                    &self.topics.read(),
                    payload::color_state(color),
                    DEVICE_QOS,
                    false,
                )
                .await?;
        }
        Ok(changed)
    }

    async fn on_write_payload(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let topic = self.topics.write();
        if let Some(patch) = parse_or_drop(&topic, bytes, payload::parse_color_patch) {
            self.patch(patch).await?;
        }
        Ok(())
    }
}
