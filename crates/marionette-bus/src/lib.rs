//! Marionette Bus
//!
//! Turns a publish/subscribe connection into buffered, topic-routed async
//! callbacks.
//!
//! # Example
//!
//! ```ignore
//! use marionette_bus::{BusConfig, PubSubClient};
//! use marionette_core::QoS;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bus = std::sync::Arc::new(PubSubClient::mqtt(BusConfig::default()));
//!     bus.connect().await?;
//!
//!     bus.subscribe("puppet/mouth/write", |topic, payload| async move {
//!         println!("{} -> {:?}", topic, payload);
//!         Ok(())
//!     }, QoS::AtLeastOnce).await?;
//!
//!     bus.start(std::time::Duration::from_millis(100), true)?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod router;
pub mod transport;

#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use client::{PubSubClient, DEFAULT_POLL_INTERVAL};
pub use config::{BusConfig, LastWill};
pub use error::{BusError, Result};
pub use memory::{MemoryTransport, PublishedMessage};
pub use router::{handler, CallbackRouter, Handler};
pub use transport::{BusTransport, Inbox, InboundMessage};

#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;
