//! Bus connection configuration

use marionette_core::DEFAULT_MQTT_PORT;
use serde::{Deserialize, Serialize};

/// Message published by the broker if this client disconnects uncleanly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastWill {
    pub topic: String,
    pub payload: String,
    #[serde(default)]
    pub retain: bool,
}

impl LastWill {
    pub fn new(topic: &str, payload: &str, retain: bool) -> Self {
        Self {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retain,
        }
    }
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Broker host name or address
    #[serde(default = "default_host")]
    pub broker_host: String,
    /// Broker port
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// Client ID for the broker session
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Keep alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u16,
    /// Capacity of the transport's request queue
    #[serde(default = "default_capacity")]
    pub request_capacity: usize,
    #[serde(default)]
    pub last_will: Option<LastWill>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("marionette-{}", &id[..8])
}

fn default_keep_alive() -> u16 {
    20
}

fn default_capacity() -> usize {
    100
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            broker_host: default_host(),
            broker_port: default_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
            request_capacity: default_capacity(),
            last_will: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = BusConfig::default();
        assert_eq!(config.broker_host, "localhost");
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.keep_alive_secs, 20);
        assert!(config.client_id.starts_with("marionette-"));
        assert!(config.last_will.is_none());
    }
}
