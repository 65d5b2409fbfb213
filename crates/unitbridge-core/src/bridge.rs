//! The bridge facade the host talks to.

use crate::ConnectionState;
use crate::collab::{ChannelId, ConnectOptions, Gateway, HostControl, HostUnits, Messenger};
use crate::config::BridgeConfig;
use crate::error::{EnumerationError, MessageError, StartError};
use crate::inventory::{InventoryCache, Snapshot};
use crate::lifecycle::{LifecycleController, StartupHandle, StateHandle};
use crate::notify::{CheckReport, NotificationPipeline};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Longest period the check timer accepts; larger values are clamped.
const MAX_CHECK_PERIOD: Duration = Duration::from_secs(86400 * 365);

/// Collaborators supplied by the host when the bridge is loaded.
pub struct BridgeParts {
    pub units: Arc<dyn HostUnits>,
    pub control: Arc<dyn HostControl>,
    pub gateway: Arc<dyn Gateway>,
    pub messenger: Arc<dyn Messenger>,
}

/// Process-wide bridge context.
///
/// Built once in [`Bridge::on_load`] and shared with every collaborator
/// that needs it; there is no global instance.
pub struct Bridge {
    config: BridgeConfig,
    lifecycle: LifecycleController,
    inventory: Arc<InventoryCache>,
    pipeline: NotificationPipeline,
    messenger: Arc<dyn Messenger>,
    runtime: Handle,
    enabled: AtomicBool,
    check_timer: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    /// Build the bridge. Everything the connection may depend on once it is
    /// ready (inventory, messenger) exists before this returns.
    pub fn on_load(config: BridgeConfig, parts: BridgeParts, runtime: Handle) -> Arc<Self> {
        tracing::info!("loading config and collaborators");

        let inventory = Arc::new(InventoryCache::new(parts.units, config.inventory_ttl()));
        let pipeline = NotificationPipeline::new(inventory.clone(), parts.messenger.clone());
        let lifecycle = LifecycleController::new(parts.gateway, parts.control, runtime.clone())
            .with_connect_timeout(config.connect_timeout());

        Arc::new(Self {
            config,
            lifecycle,
            inventory,
            pipeline,
            messenger: parts.messenger,
            runtime,
            enabled: AtomicBool::new(false),
            check_timer: Mutex::new(None),
        })
    }

    pub fn on_enable(&self) {
        self.enabled.store(true, Ordering::Release);
        tracing::info!("bridge enabled, waiting for host to finish loading");
    }

    /// The host finished loading; connect.
    pub fn on_server_ready(&self) -> Result<StartupHandle, StartError> {
        self.start_connection()
    }

    pub async fn on_disable(&self) {
        tracing::info!("disabling bridge, good bye");
        self.enabled.store(false, Ordering::Release);
        if let Some(timer) = self
            .check_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.abort();
        }
        self.shutdown().await;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn start_connection(&self) -> Result<StartupHandle, StartError> {
        let options = ConnectOptions {
            token: self.config.bot.token.clone(),
            exclusions: self.config.bot.exclude.clone(),
            presence: self.config.presence(),
        };
        self.lifecycle.start_connection(options)
    }

    /// Close the gateway connection if it is ready.
    pub async fn shutdown(&self) -> bool {
        self.lifecycle.shutdown().await
    }

    pub async fn check_inventory(&self) -> Result<CheckReport, EnumerationError> {
        self.pipeline.check().await
    }

    pub async fn inventory(&self) -> Result<Snapshot, EnumerationError> {
        self.inventory.get().await
    }

    pub fn state(&self) -> Option<ConnectionState> {
        self.lifecycle.state()
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.lifecycle.set_state(state);
    }

    pub fn state_handle(&self) -> StateHandle {
        self.lifecycle.state_handle()
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.is_ready()
    }

    /// Run `hook` once the connection first becomes ready (command
    /// registration goes here).
    pub fn on_ready(&self, hook: impl FnOnce() + Send + 'static) {
        self.lifecycle.on_ready(hook);
    }

    pub fn prefix(&self) -> &str {
        &self.config.guild.prefix
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), MessageError> {
        self.messenger.send_text(channel, text).await
    }

    /// Format and send in one call: `send_message_fmt(channel, format_args!(..))`.
    pub fn send_message_fmt(
        &self,
        channel: ChannelId,
        args: fmt::Arguments<'_>,
    ) -> impl Future<Output = Result<(), MessageError>> + Send + '_ {
        let text = args.to_string();
        async move { self.send_message(channel, &text).await }
    }

    /// Run [`Bridge::check_inventory`] every `period` while the connection is
    /// ready. Replaces any timer started earlier. A zero period starts nothing.
    pub fn spawn_check_timer(self: &Arc<Self>, period: Duration) {
        if period.is_zero() {
            tracing::warn!("check interval is zero, scheduled unit checks disabled");
            return;
        }
        let period = period.min(MAX_CHECK_PERIOD);
        let bridge = Arc::downgrade(self);
        let timer = self.runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(bridge) = bridge.upgrade() else {
                    break;
                };
                if !bridge.is_ready() {
                    tracing::debug!("connection not ready, skipping unit check");
                    continue;
                }
                if let Err(e) = bridge.check_inventory().await {
                    tracing::error!(error = %e, "scheduled unit check failed");
                }
            }
        });

        if let Some(previous) = self
            .check_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(timer)
        {
            previous.abort();
        }
    }
}
