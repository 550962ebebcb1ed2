use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use s7link_transport::{ChannelConfig, Direction};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Default inbound (controller to us) port.
pub const DEFAULT_INBOUND_PORT: u16 = 3000;
/// Default outbound (us to controller) port.
pub const DEFAULT_OUTBOUND_PORT: u16 = 3001;
/// Default read phase window.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(20);
/// Default number of messages sent per write phase.
pub const DEFAULT_BATCH_SIZE: usize = 5;
/// Default scheduler and accept-poll pause.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Engine configuration.
///
/// Durations are written in JSON as integer milliseconds (`*_ms` keys).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Local IP address both listeners bind to.
    pub address: String,
    /// How long one read phase keeps polling the inbound peer.
    #[serde(rename = "read_timeout_ms", with = "millis")]
    pub read_timeout: Duration,
    /// Port the controller connects to for sending us messages.
    pub inbound_port: u16,
    /// Port the controller connects to for receiving our messages.
    pub outbound_port: u16,
    /// Maximum messages per write phase.
    pub batch_size: usize,
    /// Pause between scheduler cycles and between accept polls.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
    /// Pause before retrying a failed bind. Zero retries immediately.
    #[serde(rename = "bind_retry_delay_ms", with = "millis")]
    pub bind_retry_delay: Duration,
    /// Bound on a single outbound send. `None` lets a send block.
    #[serde(rename = "write_timeout_ms", with = "optional_millis")]
    pub write_timeout: Option<Duration>,
    /// Drop carried partial input when a new inbound peer is accepted.
    pub reset_buffer_on_reconnect: bool,
}

impl EngineConfig {
    /// Default configuration bound to `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Parse the bind address.
    pub fn bind_ip(&self) -> Result<IpAddr> {
        self.address
            .trim()
            .parse()
            .map_err(|source| EngineError::InvalidAddress {
                address: self.address.clone(),
                source,
            })
    }

    pub(crate) fn channel_config(&self, ip: IpAddr, direction: Direction) -> ChannelConfig {
        let port = match direction {
            Direction::Inbound => self.inbound_port,
            Direction::Outbound => self.outbound_port,
        };
        ChannelConfig {
            poll_interval: self.poll_interval,
            bind_retry_delay: self.bind_retry_delay,
            write_timeout: self.write_timeout,
            ..ChannelConfig::new(direction, SocketAddr::new(ip, port))
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            inbound_port: DEFAULT_INBOUND_PORT,
            outbound_port: DEFAULT_OUTBOUND_PORT,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            bind_retry_delay: Duration::ZERO,
            write_timeout: None,
            reset_buffer_on_reconnect: true,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => super::millis::serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn defaults_match_controller_setup() {
        let config = EngineConfig::new("192.168.250.100");
        assert_eq!(config.read_timeout, Duration::from_millis(20));
        assert_eq!(config.inbound_port, 3000);
        assert_eq!(config.outbound_port, 3001);
        assert_eq!(config.batch_size, 5);
        assert_eq!(
            config.bind_ip().unwrap(),
            IpAddr::V4(Ipv4Addr::new(192, 168, 250, 100))
        );
    }

    #[test]
    fn invalid_address_is_rejected() {
        let err = EngineConfig::new("plc.local").bind_ip().unwrap_err();
        assert!(matches!(err, EngineError::InvalidAddress { address, .. } if address == "plc.local"));
    }

    #[test]
    fn json_uses_millisecond_keys_and_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"address":"127.0.0.1","read_timeout_ms":50,"write_timeout_ms":250}"#,
        )
        .unwrap();

        assert_eq!(config.read_timeout, Duration::from_millis(50));
        assert_eq!(config.write_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.inbound_port, DEFAULT_INBOUND_PORT);
        assert!(config.reset_buffer_on_reconnect);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["read_timeout_ms"], 50);
        assert_eq!(json["bind_retry_delay_ms"], 0);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: std::result::Result<EngineConfig, _> =
            serde_json::from_str(r#"{"adress":"127.0.0.1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_config_file_reports_path() {
        let path = std::env::temp_dir().join("s7link-no-such-config.json");
        let err = EngineConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, EngineError::ConfigFile { path: p, .. } if p == path));
    }

    #[test]
    fn channel_config_uses_direction_port() {
        let config = EngineConfig {
            write_timeout: Some(Duration::from_millis(100)),
            ..EngineConfig::new("127.0.0.1")
        };
        let ip = config.bind_ip().unwrap();

        let inbound = config.channel_config(ip, Direction::Inbound);
        let outbound = config.channel_config(ip, Direction::Outbound);
        assert_eq!(inbound.addr.port(), 3000);
        assert_eq!(outbound.addr.port(), 3001);
        assert_eq!(outbound.write_timeout, Some(Duration::from_millis(100)));
    }
}
