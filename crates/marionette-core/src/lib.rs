//! Marionette Core
//!
//! Shared primitives for Marionette nodes and the master.
//!
//! This crate provides:
//! - Device value types ([`Fraction`], [`Color`]) and bus QoS ([`QoS`])
//! - Device topic naming ([`DeviceTopics`])
//! - JSON payloads carried on device topics ([`payload`])
//! - Binary codecs for the servo debug and audio stream protocols ([`wire`])

pub mod error;
pub mod payload;
pub mod topic;
pub mod types;
pub mod wire;

pub use error::{Error, Result};
pub use topic::DeviceTopics;
pub use types::{Color, Fraction, QoS};
pub use wire::{AudioHeader, ServoCommand};

/// Acknowledgement byte for lock-step stream protocols
pub const ACK_BYTE: u8 = 0xAD;

/// Default MQTT broker port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default port of the servo debug listener
pub const DEFAULT_SERVO_PORT: u16 = 8888;

/// Default port of the audio stream listener
pub const DEFAULT_AUDIO_PORT: u16 = 1337;
