//! Marionette Stream
//!
//! Point-to-point TCP protocols between the master and a node. Both are
//! lock-step: the sender never has more than one unanswered frame in flight.
//!
//! - Servo debug: [`ServoServer`] on the node, [`ServoDebugClient`] on the master
//! - Audio playback: [`AudioServer`] feeding an [`AudioSink`] on the node,
//!   [`AudioStreamer`] on the master

pub mod audio;
pub mod client;
pub mod config;
pub mod error;
pub mod servo;
pub mod sink;
pub mod streamer;

pub use audio::{AudioServer, AudioSession, SessionStats};
pub use client::ServoDebugClient;
pub use config::{AudioServerConfig, ServoServerConfig};
pub use error::{Result, StreamError};
pub use servo::ServoServer;
pub use sink::{AudioFormat, AudioSink, ChannelMode, MemorySink, NullSink, PcmFileSink, Recording};
pub use streamer::{AudioStreamer, PcmClip, DEFAULT_PACKET_SIZE};
