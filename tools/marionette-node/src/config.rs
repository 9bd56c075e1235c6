//! Node configuration file
//!
//! ```toml
//! poll_interval_ms = 100
//! debug_servo = "puppet/mouth"
//!
//! [bus]
//! broker_host = "10.0.0.2"
//!
//! [[servos]]
//! root = "puppet/mouth"
//!
//! [[leds]]
//! root = "puppet/eye"
//!
//! [[strips]]
//! root = "puppet/hair"
//! length = 30
//!
//! [audio_server]
//! bind_addr = "0.0.0.0:1337"
//! read_timeout_ms = 5000
//! ```

use anyhow::{bail, Context, Result};
use marionette_bus::{BusConfig, DEFAULT_POLL_INTERVAL};
use marionette_stream::{AudioServerConfig, ServoServerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Root topic, e.g. `puppet/mouth`
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripConfig {
    pub root: String,
    /// Number of pixels
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub bus: BusConfig,
    pub poll_interval_ms: u64,
    /// Keep polling when a handler fails
    pub ignore_handler_errors: bool,
    pub servos: Vec<DeviceConfig>,
    pub leds: Vec<DeviceConfig>,
    pub strips: Vec<StripConfig>,
    /// Root of the servo driven by the debug listener; defaults to the first servo
    pub debug_servo: Option<String>,
    /// Disabled when `None`
    pub servo_server: Option<ServoServerConfig>,
    /// Disabled when `None`
    pub audio_server: Option<AudioServerConfig>,
    /// Write received audio to this raw PCM file instead of discarding it
    pub audio_output: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            ignore_handler_errors: true,
            servos: vec![DeviceConfig {
                root: "puppet/mouth".to_string(),
            }],
            leds: Vec::new(),
            strips: Vec::new(),
            debug_servo: None,
            servo_server: Some(ServoServerConfig::default()),
            audio_server: Some(AudioServerConfig::default()),
            audio_output: None,
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: NodeConfig =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Root of the servo the debug listener should drive, if any
    pub fn debug_servo_root(&self) -> Option<&str> {
        self.debug_servo
            .as_deref()
            .or_else(|| self.servos.first().map(|s| s.root.as_str()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }

        let mut roots = HashSet::new();
        let all = self
            .servos
            .iter()
            .map(|d| d.root.as_str())
            .chain(self.leds.iter().map(|d| d.root.as_str()))
            .chain(self.strips.iter().map(|s| s.root.as_str()));
        for root in all {
            if root.is_empty() {
                bail!("device root topic must not be empty");
            }
            if !roots.insert(root.trim_end_matches('/')) {
                bail!("device root '{}' is configured twice", root);
            }
        }

        if let Some(strip) = self.strips.iter().find(|s| s.length == 0) {
            bail!("strip '{}' has no pixels", strip.root);
        }

        if self.servo_server.is_some() {
            if let Some(root) = &self.debug_servo {
                if !self.servos.iter().any(|s| &s.root == root) {
                    bail!("debug_servo '{}' is not a configured servo", root);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.debug_servo_root(), Some("puppet/mouth"));
    }

    #[test]
    fn test_parse_toml() {
        let config: NodeConfig = toml::from_str(
            r#"
            poll_interval_ms = 50

            [bus]
            broker_host = "10.0.0.2"
            client_id = "node-1"

            [[servos]]
            root = "puppet/mouth"

            [[servos]]
            root = "puppet/brow"

            [[strips]]
            root = "puppet/hair"
            length = 30

            [audio_server]
            bind_addr = "0.0.0.0:1337"
            read_timeout_ms = 5000
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.bus.broker_host, "10.0.0.2");
        assert_eq!(config.bus.broker_port, 1883);
        assert_eq!(config.servos.len(), 2);
        assert_eq!(config.strips[0].length, 30);
        assert_eq!(
            config.audio_server.unwrap().read_timeout(),
            Some(Duration::from_secs(5))
        );
        // Omitted sections keep their defaults
        assert!(config.servo_server.is_some());
    }

    #[test]
    fn test_duplicate_roots_rejected() {
        let mut config = NodeConfig::default();
        config.leds.push(DeviceConfig {
            root: "puppet/mouth/".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_debug_servo_rejected() {
        let config = NodeConfig {
            debug_servo: Some("puppet/tail".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
