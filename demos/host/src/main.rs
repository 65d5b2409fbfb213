//! Minimal host embedding unitbridge.
//!
//! Treats every `*.jar` in a plugin directory as a unit and drives the
//! bridge through the usual load / enable / ready / disable sequence:
//!
//!   UNITBRIDGE_TOKEN=... cargo run -p unitbridge-demo-host -- --plugins ./plugins

mod units;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;
use unitbridge_connector_discord::{DiscordGateway, DiscordMessenger};
use unitbridge_core::{Bridge, BridgeConfig, BridgeParts, HostControl, Token};

#[derive(Debug, Parser)]
#[command(name = "unitbridge-host", about = "Run a unitbridge host against a plugin directory")]
struct Args {
    /// Bridge config; written with defaults if missing.
    #[arg(long, default_value = "unitbridge/config.toml")]
    config: PathBuf,
    /// Directory scanned for units.
    #[arg(long, default_value = "plugins")]
    plugins: PathBuf,
    /// Overrides `bot.token` from the config file.
    #[arg(long, env = "UNITBRIDGE_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

/// Lets the bridge ask the host to shut it down.
#[derive(Default)]
struct HostSignals {
    disabled: Notify,
}

impl HostControl for HostSignals {
    fn disable_integration(&self, reason: &str) {
        tracing::warn!(%reason, "bridge requested to be disabled");
        self.disabled.notify_one();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("unitbridge=info".parse()?))
        .init();

    let args = Args::parse();
    let mut config = BridgeConfig::load_or_init(&args.config)?;
    if let Some(token) = args.token {
        config.bot.token = Token::new(token);
    }
    let token = config.require_token()?.clone();

    let signals = Arc::new(HostSignals::default());
    let messenger = DiscordMessenger::new(
        &token,
        config.guild.updates_channel,
        config.guild.list_channel,
    );
    let check_interval = config.check_interval();

    let bridge = Bridge::on_load(
        config,
        BridgeParts {
            units: Arc::new(units::PluginDirectory::new(args.plugins)),
            control: signals.clone(),
            gateway: Arc::new(DiscordGateway::new()),
            messenger: Arc::new(messenger),
        },
        Handle::current(),
    );

    bridge.on_enable();
    let prefix = bridge.prefix().to_string();
    bridge.on_ready(move || {
        tracing::info!(%prefix, "connection ready, commands registered");
    });
    match check_interval {
        Some(period) => bridge.spawn_check_timer(period),
        None => tracing::info!("scheduled unit checks disabled"),
    }

    tracing::info!("host finished loading");
    let _startup = bridge.on_server_ready()?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("interrupted, shutting down");
        }
        _ = signals.disabled.notified() => {
            tracing::warn!("bridge disabled by startup failure");
        }
    }

    bridge.on_disable().await;
    Ok(())
}
