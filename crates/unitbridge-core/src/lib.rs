//! Core types and traits for unitbridge.
//!
//! This crate owns the parts of the bridge with ordering hazards: the
//! connection lifecycle, the time-bound unit inventory and the per-unit
//! notification pass. Hosts and connectors plug in through the traits in
//! [`collab`]; this crate never talks to a remote service itself.

mod bridge;
pub mod collab;
mod config;
mod error;
mod inventory;
mod lifecycle;
mod notify;

pub use bridge::{Bridge, BridgeParts};
pub use collab::{
    Capabilities, Capability, ChannelId, ConnectOptions, Gateway, HostControl, HostUnits,
    Messenger, OnlineStatus, Presence,
};
pub use config::{BotConfig, BridgeConfig, GuildConfig, InventoryConfig, Token};
pub use error::{ConfigError, ConnectError, EnumerationError, MessageError, StartError};
pub use inventory::{InventoryCache, InventoryEntry, Snapshot, DEFAULT_INVENTORY_TTL};
pub use lifecycle::{LifecycleController, StartupHandle, StartupOutcome, StateHandle};
pub use notify::{CheckReport, NotificationPipeline};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle state.
///
/// There is no edge back to `Starting` once setup has begun; the gateway
/// moves the bridge between `Ready` and `Reconnecting` on its own authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connection setup is in progress.
    Starting,
    /// Gateway handshake completed, normal operation.
    Ready,
    /// Gateway lost its session and is re-establishing it.
    Reconnecting,
}

impl ConnectionState {
    pub(crate) fn to_raw(self) -> u8 {
        match self {
            ConnectionState::Starting => 1,
            ConnectionState::Ready => 2,
            ConnectionState::Reconnecting => 3,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(ConnectionState::Starting),
            2 => Some(ConnectionState::Ready),
            3 => Some(ConnectionState::Reconnecting),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Starting => "starting",
            ConnectionState::Ready => "ready",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip_covers_every_state() {
        for state in [
            ConnectionState::Starting,
            ConnectionState::Ready,
            ConnectionState::Reconnecting,
        ] {
            assert_eq!(ConnectionState::from_raw(state.to_raw()), Some(state));
        }
        assert_eq!(ConnectionState::from_raw(0), None);
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
