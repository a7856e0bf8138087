// MIT License - Copyright (c) 2026 Peter Wright
// DSC Keybus to MQTT bridge
//
//! # keybus-bridge
//!
//! Publishes DSC alarm panel status to MQTT and relays arm/disarm commands
//! from MQTT back to the panel keypad.
//!
//! Partition status goes to `dsc/Get/Partition<n>` (`D`, `AA`, `SA`, `NA`,
//! `T`), fire status to `dsc/Get/Fire<n>` (`1`/`0`) and zone status to
//! `dsc/Get/Zone<n>` (`1`/`0`). Commands arrive on `dsc/Set` as a single
//! leading byte: `S` stay, `A` away, `N` night, `D` disarm.
//!
//! ## Quick Start
//!
//! ```no_run
//! use keybus_bridge::{Bridge, BridgeConfig, MqttBroker, TcpKeybus};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::builder()
//!         .keybus_host("192.168.0.50")
//!         .access_code("1234")
//!         .mqtt_host("192.168.0.10")
//!         .build();
//!
//!     let mut bridge = Bridge::new(&config, TcpKeybus::new(&config), MqttBroker::new(&config));
//!
//!     let mut events = bridge.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     bridge.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod broker;
pub mod command;
pub mod config;
pub mod devices;
pub mod error;
pub mod event;
pub mod panel;
pub mod protocol;
pub mod supervisor;
pub mod translator;
pub mod transport;

// Re-exports for convenience
pub use bridge::Bridge;
pub use broker::mqtt::MqttBroker;
pub use broker::{Broker, InboundMessage, Publish, StatusMessage};
pub use command::{CommandGate, CommandOutcome, CommandStats, RemoteCommand};
pub use config::{BridgeConfig, BridgeConfigBuilder, PublishPolicy, Topics, WriteWait};
pub use error::{BridgeError, Result};
pub use event::{BridgeEvent, EventReceiver};
pub use panel::PanelState;
pub use supervisor::{ConnectionState, ConnectionSupervisor};
pub use translator::{StatusTranslator, TranslateSummary};
pub use transport::tcp::TcpKeybus;
pub use transport::Keybus;
