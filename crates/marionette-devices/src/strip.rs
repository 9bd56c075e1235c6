//! Addressable LED strip channel
//!
//! Besides `<root>/write` (an alias of `write/list`) the strip listens on:
//!
//! - `<root>/write/list`: `[[r,g,b], ...]`, exactly one entry per pixel
//! - `<root>/write/single`: `{"index": i, "color": [r,g,b]}`
//! - `<root>/write/all`: `{"color": [r,g,b]}`

use marionette_bus::PubSubClient;
use marionette_core::{payload, Color, DeviceTopics, Error};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::channel::{bind, parse_or_drop, DEVICE_QOS};
use crate::driver::StripDriver;
use crate::error::Result;

struct StripState {
    driver: Box<dyn StripDriver>,
    colors: Vec<Color>,
}

pub struct StripChannel {
    topics: DeviceTopics,
    bus: Arc<PubSubClient>,
    len: usize,
    state: Mutex<StripState>,
    publishing: tokio::sync::Mutex<()>,
}

impl StripChannel {
    /// Create the channel, all pixels off, and subscribe its write topics
    pub async fn attach(
        driver: impl StripDriver + 'static,
        bus: Arc<PubSubClient>,
        root: &str,
    ) -> Result<Arc<Self>> {
        let len = driver.len();
        let channel = Arc::new(Self {
            topics: DeviceTopics::new(root),
            bus: bus.clone(),
            len,
            state: Mutex::new(StripState {
                driver: Box::new(driver),
                colors: vec![Color::OFF; len],
            }),
            publishing: tokio::sync::Mutex::new(()),
        });

        for topic in [channel.topics.write(), channel.topics.write_list()] {
            bind(&bus, &topic, &channel, |strip: Arc<Self>, bytes| async move {
                strip.on_list_payload(&bytes).await
            })
            .await?;
        }

        let topic = channel.topics.write_single();
        bind(&bus, &topic, &channel, |strip: Arc<Self>, bytes| async move {
            strip.on_single_payload(&bytes).await
        })
        .await?;

        let topic = channel.topics.write_all();
        bind(&bus, &topic, &channel, |strip: Arc<Self>, bytes| async move {
            strip.on_all_payload(&bytes).await
        })
        .await?;

        info!("Strip channel on '{}' ({} pixels)", channel.topics.root(), len);
        Ok(channel)
    }

    pub fn topics(&self) -> &DeviceTopics {
        &self.topics
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Replace every pixel; `colors` must hold exactly `len()` entries
    pub async fn write_list(&self, colors: Vec<Color>) -> Result<bool> {
        if colors.len() != self.len {
            return Err(Error::LengthMismatch {
                expected: self.len,
                actual: colors.len(),
            }
            .into());
        }
        self.update(|_| colors).await
    }

    /// Set one pixel, leaving the others as they are
    pub async fn write_single(&self, index: usize, color: Color) -> Result<bool> {
        if index >= self.len {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.len,
            }
            .into());
        }
        self.update(|current| {
            let mut colors = current.to_vec();
            colors[index] = color;
            colors
        })
        .await
    }

    /// Set every pixel to `color`
    pub async fn write_all(&self, color: Color) -> Result<bool> {
        let len = self.len;
        self.update(|_| vec![color; len]).await
    }

    pub fn read(&self) -> Vec<Color> {
        self.state.lock().colors.clone()
    }

    async fn on_list_payload(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let topic = self.topics.write_list();
        if let Some(colors) = parse_or_drop(&topic, bytes, payload::parse_color_list) {
            self.write_list(colors).await?;
        }
        Ok(())
    }

    async fn on_single_payload(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let topic = self.topics.write_single();
        if let Some(single) = parse_or_drop(&topic, bytes, payload::parse_single_write) {
            self.write_single(single.index, single.color).await?;
        }
        Ok(())
    }

    async fn on_all_payload(&self, bytes: &[u8]) -> anyhow::Result<()> {
        let topic = self.topics.write_all();
        if let Some(color) = parse_or_drop(&topic, bytes, payload::parse_broadcast) {
            self.write_all(color).await?;
        }
        Ok(())
    }

    async fn update(&self, next: impl FnOnce(&[Color]) -> Vec<Color>) -> Result<bool> {
        // Keeps broadcasts in cache order when writers race
        let _order = self.publishing.lock().await;
        let snapshot = {
            let mut state = self.state.lock();
            let colors = next(&state.colors);
            state.driver.write_pixels(&colors)?;
            if state.colors == colors {
                None
            } else {
                state.colors = colors;
                Some(state.colors.clone())
            }
        };

        let Some(colors) = snapshot else {
            return Ok(false);
        };
        debug!("{} -> {} pixels updated", self.topics.root(), colors.len());
        self.bus
            .publish(
                &self.topics.read(),
                payload::strip_state(&colors),
                DEVICE_QOS,
                false,
            )
            .await?;
        Ok(true)
    }
}
