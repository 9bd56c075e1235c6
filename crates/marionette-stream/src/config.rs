//! Listener configuration

use marionette_core::{DEFAULT_AUDIO_PORT, DEFAULT_SERVO_PORT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoServerConfig {
    /// Address the servo debug listener binds to
    pub bind_addr: String,
}

impl Default for ServoServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_SERVO_PORT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioServerConfig {
    /// Address the audio listener binds to
    pub bind_addr: String,
    /// Give up on a client that sends nothing for this long (milliseconds).
    /// `None` waits forever.
    pub read_timeout_ms: Option<u64>,
}

impl AudioServerConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for AudioServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_AUDIO_PORT),
            read_timeout_ms: None,
        }
    }
}
