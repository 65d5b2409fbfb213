//! Collaborator traits.
//!
//! The bridge composes three external parties: the host that embeds it, the
//! gateway client that owns the remote connection, and the messenger that
//! formats and delivers notifications. All of them are shared across threads
//! behind `Arc<dyn _>`, so async methods return boxed futures.

use crate::config::Token;
use crate::error::{ConnectError, EnumerationError, MessageError};
use crate::inventory::{InventoryEntry, Snapshot};
use crate::lifecycle::StateHandle;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The host application embedding the bridge.
pub trait HostUnits: Send + Sync + 'static {
    /// Enumerate the units currently managed by the host, in any order.
    ///
    /// May block (disk or registry access); it is called on the blocking
    /// thread pool, never on an async worker.
    fn enumerate_units(&self) -> Result<Vec<InventoryEntry>, EnumerationError>;
}

/// Host-side control over this integration.
pub trait HostControl: Send + Sync + 'static {
    /// Disable the integration. Called once after a terminal startup failure.
    fn disable_integration(&self, reason: &str);
}

/// Gateway client owning the remote real-time connection.
///
/// Implementations push state transitions through the [`StateHandle`] they
/// are given; the bridge accepts them verbatim.
pub trait Gateway: Send + Sync + 'static {
    fn connect(
        &self,
        options: ConnectOptions,
        state: StateHandle,
    ) -> BoxFuture<'_, Result<(), ConnectError>>;

    /// Close an established connection gracefully.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Formats and delivers messages to remote channels.
pub trait Messenger: Send + Sync + 'static {
    /// Check a single unit and announce it if it changed.
    fn send_unit_update<'a>(
        &'a self,
        entry: &'a InventoryEntry,
    ) -> BoxFuture<'a, Result<(), MessageError>>;

    /// Republish the aggregate unit list.
    fn refresh_unit_list<'a>(
        &'a self,
        snapshot: &'a Snapshot,
    ) -> BoxFuture<'a, Result<(), MessageError>>;

    fn send_text<'a>(
        &'a self,
        channel: ChannelId,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), MessageError>>;
}

/// Remote channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Optional gateway features the bridge can ask to leave out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Per-client online status of members.
    ClientStatus,
    /// Member activities (games, streams).
    Activity,
    /// Voice channel membership.
    VoiceState,
    /// Bulk member list downloads.
    MemberChunking,
}

/// Set of capabilities excluded from the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities {
    excluded: BTreeSet<Capability>,
}

impl Capabilities {
    /// Nothing excluded.
    pub fn none() -> Self {
        Self {
            excluded: BTreeSet::new(),
        }
    }

    pub fn exclude(mut self, capability: Capability) -> Self {
        self.excluded.insert(capability);
        self
    }

    pub fn is_excluded(&self, capability: Capability) -> bool {
        self.excluded.contains(&capability)
    }

    pub fn excluded(&self) -> impl Iterator<Item = Capability> + '_ {
        self.excluded.iter().copied()
    }
}

impl Default for Capabilities {
    /// The bridge only needs guild messages; everything member-heavy is off.
    fn default() -> Self {
        Self::none()
            .exclude(Capability::ClientStatus)
            .exclude(Capability::Activity)
            .exclude(Capability::VoiceState)
            .exclude(Capability::MemberChunking)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnlineStatus {
    Online,
    Idle,
    DoNotDisturb,
    Invisible,
}

/// Presence shown while the connection comes up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub status: OnlineStatus,
    pub activity: Option<String>,
}

impl Default for Presence {
    fn default() -> Self {
        Self {
            status: OnlineStatus::DoNotDisturb,
            activity: Some("Starting...".to_string()),
        }
    }
}

/// Everything the gateway needs to establish a connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub token: Token,
    pub exclusions: Capabilities,
    pub presence: Presence,
}
