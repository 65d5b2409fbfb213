//! Unit announcements over the Discord REST API.

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use twilight_http::Client;
use twilight_model::id::Id;
use twilight_model::id::marker::ChannelMarker;
use unitbridge_core::{ChannelId, InventoryEntry, MessageError, Messenger, Snapshot, Token};

/// Discord rejects messages longer than this.
const MESSAGE_LIMIT: usize = 2000;

/// What changed about a unit since it was last seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionChange {
    /// Never seen before. Recorded without an announcement.
    New,
    Unchanged,
    Updated { previous: String },
}

/// Last announced version per unit name.
#[derive(Debug, Default)]
pub struct VersionLedger {
    versions: HashMap<String, String>,
}

impl VersionLedger {
    /// Compare `entry` against the ledger. New units are recorded right away;
    /// updates are only recorded through [`VersionLedger::confirm`].
    pub fn observe(&mut self, entry: &InventoryEntry) -> VersionChange {
        match self.versions.get(&entry.name) {
            None => {
                self.confirm(entry);
                VersionChange::New
            }
            Some(version) if *version == entry.version => VersionChange::Unchanged,
            Some(version) => VersionChange::Updated {
                previous: version.clone(),
            },
        }
    }

    pub fn confirm(&mut self, entry: &InventoryEntry) {
        self.versions
            .insert(entry.name.clone(), entry.version.clone());
    }
}

/// Render the aggregate unit list as a single Discord message.
pub fn render_unit_list(snapshot: &Snapshot) -> String {
    let header = format!("**Installed units ({})**\n```\n", snapshot.len());
    let footer = "```";
    let mut body = String::new();

    for (shown, entry) in snapshot.iter().enumerate() {
        let line = format!("{} {}\n", entry.name, entry.version);
        let remaining = snapshot.len() - shown;
        let more = format!("... and {remaining} more\n");
        if header.len() + body.len() + line.len() + more.len() + footer.len() > MESSAGE_LIMIT {
            body.push_str(&more);
            break;
        }
        body.push_str(&line);
    }

    format!("{header}{body}{footer}")
}

fn render_update(entry: &InventoryEntry, previous: &str) -> String {
    let mut text = format!(
        "**{}** was updated: `{}` -> `{}`",
        entry.name, previous, entry.version
    );
    if let Some(resource) = &entry.resource {
        text.push_str(&format!("\n<{resource}>"));
    }
    text
}

/// [`Messenger`] posting to Discord channels.
pub struct DiscordMessenger {
    http: Client,
    updates_channel: Option<ChannelId>,
    list_channel: Option<ChannelId>,
    ledger: Mutex<VersionLedger>,
    last_list: Mutex<Option<String>>,
}

impl DiscordMessenger {
    pub fn new(
        token: &Token,
        updates_channel: Option<ChannelId>,
        list_channel: Option<ChannelId>,
    ) -> Self {
        Self {
            http: Client::new(token.expose().to_string()),
            updates_channel,
            list_channel,
            ledger: Mutex::new(VersionLedger::default()),
            last_list: Mutex::new(None),
        }
    }

    async fn post(&self, channel: ChannelId, text: &str) -> Result<(), MessageError> {
        let id = Id::<ChannelMarker>::new_checked(channel.0)
            .ok_or(MessageError::InvalidChannel(channel.0))?;
        self.http
            .create_message(id)
            .content(text)
            .await
            .map_err(|e| MessageError::Delivery(e.to_string()))?;
        Ok(())
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, VersionLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Messenger for DiscordMessenger {
    fn send_unit_update<'a>(
        &'a self,
        entry: &'a InventoryEntry,
    ) -> BoxFuture<'a, Result<(), MessageError>> {
        Box::pin(async move {
            let change = self.ledger().observe(entry);
            let VersionChange::Updated { previous } = change else {
                return Ok(());
            };

            if let Some(channel) = self.updates_channel {
                self.post(channel, &render_update(entry, &previous)).await?;
                tracing::info!(
                    unit = %entry.name,
                    %previous,
                    version = %entry.version,
                    "announced unit update"
                );
            } else {
                tracing::debug!(unit = %entry.name, "no updates channel configured");
            }
            self.ledger().confirm(entry);
            Ok(())
        })
    }

    fn refresh_unit_list<'a>(
        &'a self,
        snapshot: &'a Snapshot,
    ) -> BoxFuture<'a, Result<(), MessageError>> {
        Box::pin(async move {
            let Some(channel) = self.list_channel else {
                return Ok(());
            };

            let text = render_unit_list(snapshot);
            let unchanged = self
                .last_list
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_deref()
                == Some(text.as_str());
            if unchanged {
                return Ok(());
            }

            self.post(channel, &text).await?;
            *self
                .last_list
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(text);
            Ok(())
        })
    }

    fn send_text<'a>(
        &'a self,
        channel: ChannelId,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), MessageError>> {
        Box::pin(self.post(channel, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, version: &str) -> InventoryEntry {
        InventoryEntry::new(name, version)
    }

    #[test]
    fn first_sighting_is_recorded_silently() {
        let mut ledger = VersionLedger::default();
        assert_eq!(ledger.observe(&entry("Alpha", "1.0")), VersionChange::New);
        assert_eq!(ledger.observe(&entry("Alpha", "1.0")), VersionChange::Unchanged);
    }

    #[test]
    fn update_stays_pending_until_confirmed() {
        let mut ledger = VersionLedger::default();
        ledger.observe(&entry("Alpha", "1.0"));

        let updated = entry("Alpha", "1.1");
        let expected = VersionChange::Updated {
            previous: "1.0".to_string(),
        };
        assert_eq!(ledger.observe(&updated), expected);
        assert_eq!(ledger.observe(&updated), expected);

        ledger.confirm(&updated);
        assert_eq!(ledger.observe(&updated), VersionChange::Unchanged);
    }

    #[test]
    fn unit_list_is_rendered_in_snapshot_order() {
        let snapshot = Snapshot::from_unsorted(vec![entry("beta", "2"), entry("Alpha", "1")]);
        assert_eq!(
            render_unit_list(&snapshot),
            "**Installed units (2)**\n```\nAlpha 1\nbeta 2\n```"
        );
    }

    #[test]
    fn long_unit_list_is_truncated() {
        let entries = (0..500)
            .map(|i| entry(&format!("unit-{i:03}"), "1.0.0"))
            .collect();
        let text = render_unit_list(&Snapshot::from_unsorted(entries));
        assert!(text.len() <= MESSAGE_LIMIT);
        assert!(text.contains("more\n```"));
        assert!(text.starts_with("**Installed units (500)**"));
    }

    #[test]
    fn update_mentions_resource() {
        let e = entry("Alpha", "2.0").with_resource("https://example.com/alpha");
        assert_eq!(
            render_update(&e, "1.0"),
            "**Alpha** was updated: `1.0` -> `2.0`\n<https://example.com/alpha>"
        );
    }
}
