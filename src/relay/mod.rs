//! MQTT relay
//!
//! Exposes the command surface through a broker for processes that cannot
//! hold the robot socket themselves.
//!
//! ```text
//!   RelayClient ──publish──► <prefix>/command-submitted ──► RelayServer ──► dispatcher
//!        ▲                                                       │
//!        └──── <prefix>/command-result ◄─────────────────────────┤
//!        └──── <prefix>/connection-state-changed ◄───────────────┘
//! ```
//!
//! The server does not republish its own submissions; the topic is inbound
//! only, so relayed commands cannot loop back.

mod client;
mod events;
mod server;

use std::time::Duration;

use rumqttc::MqttOptions;
use serde::{Deserialize, Serialize};

use crate::config::RelayConfig;

pub use client::{RelayClient, RelayMessage};
pub use events::{CommandResult, CommandSubmitted, ConnectionStateChanged, Topics};
pub use server::RelayServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayRole {
    #[default]
    Off,
    /// Holds the robot socket and serves relayed commands
    Server,
    /// Sends every command through the broker
    Client,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("MQTT client error: {0}")]
    Client(String),

    #[error("Broker unreachable: {0}")]
    BrokerUnreachable(String),

    #[error("Invalid relay payload: {0}")]
    Payload(String),
}

fn mqtt_options(config: &RelayConfig, role: &str) -> MqttOptions {
    let mut options = MqttOptions::new(
        format!("{}-{}", config.client_id, role),
        config.broker_host.clone(),
        config.broker_port,
    );
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(1)));
    if let Some(user) = &config.user {
        options.set_credentials(user.clone(), config.password.clone().unwrap_or_default());
    }
    options
}
