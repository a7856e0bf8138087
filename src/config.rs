// MIT License - Copyright (c) 2026 Peter Wright
// Bridge configuration

use std::time::Duration;

/// What the status translator does with a change flag whose publish failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishPolicy {
    /// Clear the flag regardless of the publish result. The message is not
    /// revisited until the underlying status changes again.
    #[default]
    FireAndForget,
    /// Leave the flag set so the next translator run publishes it again.
    RetryUntilSuccess,
}

/// How long an accepted command waits for the keybus write channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteWait {
    /// Keep stepping the bus until it reports write-ready, however long that takes.
    #[default]
    Unbounded,
    /// Give up with `BridgeError::WriteTimeout` after the given duration.
    Timeout(Duration),
}

/// MQTT topic layout.
///
/// Per-entity topics are the base topic followed by the 1-based index,
/// e.g. `dsc/Get/Partition` + `1` → `dsc/Get/Partition1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Base topic for partition arm/alarm status
    pub partition: String,
    /// Base topic for zone open/closed status
    pub zone: String,
    /// Base topic for fire status
    pub fire: String,
    /// Inbound command topic
    pub command: String,
    /// Availability topic (`online`/`offline`), disabled when `None`
    pub availability: Option<String>,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            partition: "dsc/Get/Partition".to_string(),
            zone: "dsc/Get/Zone".to_string(),
            fire: "dsc/Get/Fire".to_string(),
            command: "dsc/Set".to_string(),
            availability: Some("dsc/Status".to_string()),
        }
    }
}

impl Topics {
    pub fn partition(&self, id: usize) -> String {
        format!("{}{}", self.partition, id)
    }

    pub fn zone(&self, zone: u32) -> String {
        format!("{}{}", self.zone, zone)
    }

    pub fn fire(&self, id: usize) -> String {
        format!("{}{}", self.fire, id)
    }
}

/// Configuration for the keybus bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Keybus decoder host
    pub keybus_host: String,
    /// Keybus decoder TCP port
    pub keybus_port: u16,
    /// Delay between keybus link reconnection attempts in milliseconds
    pub keybus_reconnect_delay_ms: u64,
    /// Longest a single keybus processing step waits for a decoded line
    pub keybus_step_ms: u64,
    /// Access code written to disarm, or when the panel prompts for one
    pub access_code: String,
    /// MQTT broker host
    pub mqtt_host: String,
    /// MQTT broker port
    pub mqtt_port: u16,
    /// MQTT client identifier
    pub client_id: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    /// MQTT keep-alive in seconds
    pub keep_alive_secs: u64,
    /// Longest a single connect attempt waits for CONNACK in milliseconds
    pub mqtt_connect_timeout_ms: u64,
    /// Longest a single broker event-loop step waits in milliseconds
    pub mqtt_step_ms: u64,
    /// Fixed interval between broker reconnect attempts in milliseconds
    pub reconnect_interval_ms: u64,
    pub topics: Topics,
    pub publish_policy: PublishPolicy,
    pub write_wait: WriteWait,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            keybus_host: "127.0.0.1".to_string(),
            keybus_port: 4025,
            keybus_reconnect_delay_ms: 10000,
            keybus_step_ms: 10,
            access_code: String::new(),
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            client_id: "dscKeybusInterface".to_string(),
            mqtt_username: None,
            mqtt_password: None,
            keep_alive_secs: 30,
            mqtt_connect_timeout_ms: 3000,
            mqtt_step_ms: 10,
            reconnect_interval_ms: 5000,
            topics: Topics::default(),
            publish_policy: PublishPolicy::FireAndForget,
            write_wait: WriteWait::Unbounded,
        }
    }
}

impl BridgeConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// Builder for BridgeConfig.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn keybus_host(mut self, host: impl Into<String>) -> Self {
        self.config.keybus_host = host.into();
        self
    }

    pub fn keybus_port(mut self, port: u16) -> Self {
        self.config.keybus_port = port;
        self
    }

    pub fn keybus_reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.keybus_reconnect_delay_ms = ms;
        self
    }

    pub fn keybus_step_ms(mut self, ms: u64) -> Self {
        self.config.keybus_step_ms = ms;
        self
    }

    pub fn access_code(mut self, code: impl Into<String>) -> Self {
        self.config.access_code = code.into();
        self
    }

    pub fn mqtt_host(mut self, host: impl Into<String>) -> Self {
        self.config.mqtt_host = host.into();
        self
    }

    pub fn mqtt_port(mut self, port: u16) -> Self {
        self.config.mqtt_port = port;
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = id.into();
        self
    }

    pub fn mqtt_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.mqtt_username = Some(username.into());
        self.config.mqtt_password = Some(password.into());
        self
    }

    pub fn keep_alive_secs(mut self, secs: u64) -> Self {
        self.config.keep_alive_secs = secs;
        self
    }

    pub fn mqtt_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.mqtt_connect_timeout_ms = ms;
        self
    }

    pub fn mqtt_step_ms(mut self, ms: u64) -> Self {
        self.config.mqtt_step_ms = ms;
        self
    }

    pub fn reconnect_interval_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_interval_ms = ms;
        self
    }

    pub fn topics(mut self, topics: Topics) -> Self {
        self.config.topics = topics;
        self
    }

    pub fn publish_policy(mut self, policy: PublishPolicy) -> Self {
        self.config.publish_policy = policy;
        self
    }

    pub fn write_wait(mut self, wait: WriteWait) -> Self {
        self.config.write_wait = wait;
        self
    }

    pub fn build(self) -> BridgeConfig {
        self.config
    }
}
