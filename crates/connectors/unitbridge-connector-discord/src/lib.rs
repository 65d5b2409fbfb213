//! Discord connector for unitbridge.
//!
//! [`DiscordGateway`] owns the gateway shard and reports connection state to
//! the bridge; [`DiscordMessenger`] posts unit updates and the unit list.

mod gateway;
mod messenger;

pub use gateway::{DiscordGateway, intents_for, presence_payload};
pub use messenger::{DiscordMessenger, VersionChange, VersionLedger, render_unit_list};
