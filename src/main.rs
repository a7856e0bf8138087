// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::Duration;
use tracing::info;

use keybus_bridge::{
    Bridge, BridgeConfig, BridgeEvent, MqttBroker, PublishPolicy, TcpKeybus, Topics, WriteWait,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "keybus2mqtt")]
#[command(about = "Bridge between a DSC Keybus interface and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    keybus: KeybusToml,
    mqtt: MqttToml,
    #[serde(default)]
    behaviour: BehaviourToml,
}

#[derive(Debug, Deserialize)]
struct KeybusToml {
    host: String,
    #[serde(default = "default_keybus_port")]
    port: u16,
    /// Panel access code, written to disarm and at access-code prompts
    #[serde(default)]
    access_code: String,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
}

fn default_keybus_port() -> u16 {
    4025
}
fn default_reconnect_delay() -> u64 {
    10000
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default = "default_keep_alive")]
    keep_alive_secs: u64,
    #[serde(default = "default_reconnect_interval")]
    reconnect_interval_ms: u64,
    #[serde(default)]
    topics: TopicsToml,
}

fn default_client_id() -> String {
    "dscKeybusInterface".to_string()
}
fn default_keep_alive() -> u64 {
    30
}
fn default_reconnect_interval() -> u64 {
    5000
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct TopicsToml {
    partition: String,
    zone: String,
    fire: String,
    command: String,
    /// Empty string disables the availability topic
    availability: String,
}

impl Default for TopicsToml {
    fn default() -> Self {
        let topics = Topics::default();
        Self {
            partition: topics.partition,
            zone: topics.zone,
            fire: topics.fire,
            command: topics.command,
            availability: topics.availability.unwrap_or_default(),
        }
    }
}

impl From<TopicsToml> for Topics {
    fn from(toml: TopicsToml) -> Self {
        Self {
            partition: toml.partition,
            zone: toml.zone,
            fire: toml.fire,
            command: toml.command,
            availability: Some(toml.availability).filter(|topic| !topic.is_empty()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BehaviourToml {
    publish_policy: PublishPolicyToml,
    /// Give up on a command after this long without write readiness.
    /// Unset waits indefinitely.
    write_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PublishPolicyToml {
    #[default]
    FireAndForget,
    RetryUntilSuccess,
}

impl From<PublishPolicyToml> for PublishPolicy {
    fn from(toml: PublishPolicyToml) -> Self {
        match toml {
            PublishPolicyToml::FireAndForget => PublishPolicy::FireAndForget,
            PublishPolicyToml::RetryUntilSuccess => PublishPolicy::RetryUntilSuccess,
        }
    }
}

fn build_bridge_config(config: Config) -> Result<BridgeConfig> {
    let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;

    let write_wait = match config.behaviour.write_timeout_ms {
        Some(ms) => WriteWait::Timeout(Duration::from_millis(ms)),
        None => WriteWait::Unbounded,
    };

    let mut builder = BridgeConfig::builder()
        .keybus_host(config.keybus.host)
        .keybus_port(config.keybus.port)
        .keybus_reconnect_delay_ms(config.keybus.reconnect_delay_ms)
        .access_code(config.keybus.access_code)
        .mqtt_host(mqtt_host)
        .mqtt_port(mqtt_port)
        .client_id(config.mqtt.client_id)
        .keep_alive_secs(config.mqtt.keep_alive_secs)
        .reconnect_interval_ms(config.mqtt.reconnect_interval_ms)
        .topics(config.mqtt.topics.into())
        .publish_policy(config.behaviour.publish_policy.into())
        .write_wait(write_wait);

    if let Some(username) = config.mqtt.username {
        builder = builder.mqtt_credentials(username, config.mqtt.password.unwrap_or_default());
    }

    Ok(builder.build())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=keybus_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    // Load config
    let config_text =
        std::fs::read_to_string(&cli.config).context("Failed to read config file")?;
    let config: Config = toml::from_str(&config_text).context("Failed to parse config file")?;
    let bridge_config = build_bridge_config(config)?;

    let mut sigterm = signal(SignalKind::terminate())?;

    let bus = TcpKeybus::new(&bridge_config);
    let broker = MqttBroker::new(&bridge_config);
    let mut bridge = Bridge::new(&bridge_config, bus, broker);

    // Surface the events that have no MQTT counterpart in the log
    let mut events = bridge.subscribe();
    let event_handle = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                BridgeEvent::CommandTimedOut(command) => {
                    info!("Command {command} timed out waiting for the panel")
                }
                BridgeEvent::BufferOverflow => info!("Keybus decoder overflowed"),
                other => tracing::debug!("Bridge event: {:?}", other),
            }
        }
    });

    info!(
        "Bridging keybus at {}:{} to MQTT at {}:{}",
        bridge_config.keybus_host,
        bridge_config.keybus_port,
        bridge_config.mqtt_host,
        bridge_config.mqtt_port
    );

    tokio::select! {
        result = bridge.run() => {
            result.context("Failed to connect to keybus decoder")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    event_handle.abort();
    info!("Shutdown complete");
    Ok(())
}
