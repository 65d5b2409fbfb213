//! Bridge configuration.
//!
//! ```toml
//! [bot]
//! token = "..."
//!
//! [guild]
//! prefix = "!"
//! updates_channel = 1234
//! list_channel = 5678
//!
//! [inventory]
//! ttl_secs = 300
//! ```

use crate::collab::{Capabilities, ChannelId, OnlineStatus, Presence};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Written to disk by [`BridgeConfig::load_or_init`] when no config exists.
pub const DEFAULT_CONFIG: &str = r#"# unitbridge configuration

[bot]
# Bot token used to authenticate with the gateway.
token = ""
# Give up on connection setup after this many seconds.
connect_timeout_secs = 60
presence_status = "do_not_disturb"
presence_activity = "Starting..."
# Gateway features to leave out.
exclude = ["client_status", "activity", "voice_state", "member_chunking"]

[guild]
prefix = "!"
# Channel receiving per-unit update announcements.
updates_channel = 0
# Channel holding the aggregate unit list.
list_channel = 0

[inventory]
ttl_secs = 300
check_interval_secs = 600
"#;

/// Secret bot token. Never printed.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub bot: BotConfig,
    #[serde(default)]
    pub guild: GuildConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub token: Token,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_presence_status")]
    pub presence_status: OnlineStatus,
    #[serde(default = "default_presence_activity")]
    pub presence_activity: Option<String>,
    #[serde(default)]
    pub exclude: Capabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub updates_channel: Option<ChannelId>,
    #[serde(default)]
    pub list_channel: Option<ChannelId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

fn default_connect_timeout() -> u64 {
    60
}

fn default_presence_status() -> OnlineStatus {
    Presence::default().status
}

fn default_presence_activity() -> Option<String> {
    Presence::default().activity
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_ttl() -> u64 {
    300
}

fn default_check_interval() -> u64 {
    600
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            updates_channel: None,
            list_channel: None,
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            check_interval_secs: default_check_interval(),
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let mut config: BridgeConfig = toml::from_str(s)?;
        // Channel id 0 in the template means "not configured".
        config.guild.updates_channel = config.guild.updates_channel.filter(|c| c.0 != 0);
        config.guild.list_channel = config.guild.list_channel.filter(|c| c.0 != 0);
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load `path`, writing [`DEFAULT_CONFIG`] there first if it is missing.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
            std::fs::write(path, DEFAULT_CONFIG).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            tracing::info!(path = %path.display(), "wrote default config");
        }
        Self::load(path)
    }

    /// Fails if no token has been configured.
    pub fn require_token(&self) -> Result<&Token, ConfigError> {
        if self.bot.token.is_empty() {
            return Err(ConfigError::Missing("bot.token"));
        }
        Ok(&self.bot.token)
    }

    pub fn presence(&self) -> Presence {
        Presence {
            status: self.bot.presence_status,
            activity: self.bot.presence_activity.clone(),
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.bot.connect_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn inventory_ttl(&self) -> Duration {
        Duration::from_secs(self.inventory.ttl_secs)
    }

    /// Period of the scheduled unit check; `None` when set to 0.
    pub fn check_interval(&self) -> Option<Duration> {
        match self.inventory.check_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
