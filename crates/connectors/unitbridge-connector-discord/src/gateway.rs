//! Gateway shard management.

use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use twilight_gateway::{
    CloseFrame, ConfigBuilder, Event, EventTypeFlags, Intents, MessageSender, Shard, ShardId,
    StreamExt as _,
};
use twilight_http::Client;
use twilight_http::error::ErrorType;
use twilight_model::gateway::payload::outgoing::update_presence::UpdatePresencePayload;
use twilight_model::gateway::presence::{ActivityType, MinimalActivity, Status};
use unitbridge_core::{
    Capabilities, Capability, ConnectError, ConnectOptions, ConnectionState, Gateway,
    OnlineStatus, Presence, StateHandle,
};

/// How long a graceful close may take before the shard task is aborted.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Gateway intents for a set of capability exclusions.
pub fn intents_for(capabilities: &Capabilities) -> Intents {
    let mut intents = Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT;
    if !capabilities.is_excluded(Capability::ClientStatus)
        || !capabilities.is_excluded(Capability::Activity)
    {
        intents |= Intents::GUILD_PRESENCES;
    }
    if !capabilities.is_excluded(Capability::VoiceState) {
        intents |= Intents::GUILD_VOICE_STATES;
    }
    if !capabilities.is_excluded(Capability::MemberChunking) {
        intents |= Intents::GUILD_MEMBERS;
    }
    intents
}

/// Presence sent with IDENTIFY. `None` when no activity is configured.
pub fn presence_payload(presence: &Presence) -> Option<UpdatePresencePayload> {
    let status = match presence.status {
        OnlineStatus::Online => Status::Online,
        OnlineStatus::Idle => Status::Idle,
        OnlineStatus::DoNotDisturb => Status::DoNotDisturb,
        OnlineStatus::Invisible => Status::Invisible,
    };
    let activity = MinimalActivity {
        kind: ActivityType::Playing,
        name: presence.activity.clone()?,
        url: None,
    };
    UpdatePresencePayload::new(vec![activity.into()], false, None, status).ok()
}

struct Running {
    sender: MessageSender,
    closing: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// [`Gateway`] backed by a single Discord gateway shard.
#[derive(Default)]
pub struct DiscordGateway {
    running: Mutex<Option<Running>>,
}

impl DiscordGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Gateway for DiscordGateway {
    fn connect(
        &self,
        options: ConnectOptions,
        state: StateHandle,
    ) -> BoxFuture<'_, Result<(), ConnectError>> {
        Box::pin(async move {
            let token = options.token.expose().to_string();

            // The shard only learns about a bad token after IDENTIFY; ask the
            // REST API first so rejection surfaces here.
            let http = Client::new(token.clone());
            if let Err(e) = http.current_user().await {
                return Err(match e.kind() {
                    ErrorType::Unauthorized => ConnectError::Authentication(e.to_string()),
                    _ => ConnectError::Transient(e.to_string()),
                });
            }

            let mut config = ConfigBuilder::new(token, intents_for(&options.exclusions));
            if let Some(presence) = presence_payload(&options.presence) {
                config = config.presence(presence);
            }
            let shard = Shard::with_config(ShardId::ONE, config.build());
            let sender = shard.sender();
            let closing = Arc::new(AtomicBool::new(false));
            let task = tokio::spawn(run_shard(shard, state, closing.clone()));

            let previous = self.running.lock().await.replace(Running {
                sender,
                closing,
                task,
            });
            if let Some(previous) = previous {
                previous.task.abort();
            }
            tracing::info!("gateway shard started");
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let Some(mut running) = self.running.lock().await.take() else {
                return;
            };
            running.closing.store(true, Ordering::Release);
            close_frame_sent(running.sender.close(CloseFrame::NORMAL));

            if tokio::time::timeout(CLOSE_GRACE, &mut running.task)
                .await
                .is_err()
            {
                tracing::warn!("gateway did not close in time, aborting shard");
                running.task.abort();
            }
        })
    }
}

/// Whether the close frame was queued. A failure means the shard already
/// stopped; the task join below still runs.
fn close_frame_sent<E: fmt::Display>(result: Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "close frame not sent, shard already stopped");
            false
        }
    }
}

async fn run_shard(mut shard: Shard, state: StateHandle, closing: Arc<AtomicBool>) {
    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => event,
            Err(source) => {
                tracing::warn!(?source, "error receiving gateway event");
                continue;
            }
        };

        match event {
            Event::Ready(_) | Event::Resumed => state.set(ConnectionState::Ready),
            Event::GatewayReconnect | Event::GatewayInvalidateSession(_) => {
                state.set(ConnectionState::Reconnecting)
            }
            Event::GatewayClose(_) if closing.load(Ordering::Acquire) => break,
            Event::GatewayClose(frame) => {
                tracing::warn!(?frame, "gateway closed, reconnecting");
                state.set(ConnectionState::Reconnecting);
            }
            _ => {}
        }
    }

    if !closing.load(Ordering::Acquire) {
        tracing::error!("gateway shard stopped unexpectedly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_frame_result_is_reported() {
        assert!(close_frame_sent::<&str>(Ok(())));
        assert!(!close_frame_sent(Err("channel closed")));
    }

    #[test]
    fn default_exclusions_keep_only_message_intents() {
        let intents = intents_for(&Capabilities::default());
        assert_eq!(
            intents,
            Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT
        );
    }

    #[test]
    fn nothing_excluded_enables_member_intents() {
        let intents = intents_for(&Capabilities::none());
        assert!(intents.contains(Intents::GUILD_PRESENCES));
        assert!(intents.contains(Intents::GUILD_VOICE_STATES));
        assert!(intents.contains(Intents::GUILD_MEMBERS));
    }

    #[test]
    fn presence_needs_an_activity() {
        let presence = Presence {
            status: OnlineStatus::Idle,
            activity: None,
        };
        assert!(presence_payload(&presence).is_none());
    }

    #[test]
    fn default_presence_is_do_not_disturb() {
        let payload = presence_payload(&Presence::default()).unwrap();
        assert_eq!(payload.status, Status::DoNotDisturb);
        assert_eq!(payload.activities.len(), 1);
        assert_eq!(payload.activities[0].name, "Starting...");
    }
}
