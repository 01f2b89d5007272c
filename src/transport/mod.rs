//! Protocol transport
//!
//! Owns the one TCP connection to the controller. Every other component goes
//! through [`Transport::send_command`] (via the dispatcher) and observes the
//! link through a `watch` receiver of [`ConnectionState`].

mod client;
mod reconnect;

use serde::{Deserialize, Serialize};

pub use client::{Transport, TransportSettings};
pub use reconnect::{Backoff, ReconnectPolicy, ReconnectSupervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}
