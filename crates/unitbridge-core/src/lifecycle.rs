//! Connection lifecycle.
//!
//! Connection setup runs on its own task so the host's control path never
//! waits on the network. A second supervising task awaits the setup task and
//! decides what its result means: authentication rejection disables the
//! integration, any other failure or panic is logged and contained.

use crate::ConnectionState;
use crate::collab::{ConnectOptions, Gateway, HostControl};
use crate::error::{ConnectError, StartError};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

type ReadyHook = Box<dyn FnOnce() + Send>;

struct StateCell {
    raw: AtomicU8,
    ready_seen: AtomicBool,
    ready_hooks: Mutex<Vec<ReadyHook>>,
}

/// Shared handle to the connection state.
///
/// Handed to the gateway so it can push transitions from its own tasks.
/// Transitions are accepted verbatim.
#[derive(Clone)]
pub struct StateHandle {
    cell: Arc<StateCell>,
}

impl StateHandle {
    fn new() -> Self {
        Self {
            cell: Arc::new(StateCell {
                raw: AtomicU8::new(0),
                ready_seen: AtomicBool::new(false),
                ready_hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// `None` until connection setup has begun.
    pub fn get(&self) -> Option<ConnectionState> {
        ConnectionState::from_raw(self.cell.raw.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ConnectionState) {
        let raw = self.cell.raw.swap(state.to_raw(), Ordering::AcqRel);
        let previous = ConnectionState::from_raw(raw);
        if previous != Some(state) {
            tracing::info!(from = ?previous, to = %state, "connection state changed");
        }

        if state == ConnectionState::Ready && !self.cell.ready_seen.swap(true, Ordering::AcqRel) {
            let hooks = std::mem::take(
                &mut *self
                    .cell
                    .ready_hooks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            for hook in hooks {
                hook();
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.get() == Some(ConnectionState::Ready)
    }

    fn on_first_ready(&self, hook: ReadyHook) {
        {
            let mut hooks = self
                .cell
                .ready_hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.cell.ready_seen.load(Ordering::Acquire) {
                hooks.push(hook);
                return;
            }
        }
        hook();
    }
}

impl std::fmt::Debug for StateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateHandle").field("state", &self.get()).finish()
    }
}

/// How the connection-setup task ended.
#[derive(Debug, Clone)]
pub enum StartupOutcome {
    /// The gateway accepted the connection; readiness follows via events.
    Connected,
    /// Token rejected. The host has been asked to disable the integration.
    AuthenticationRejected(String),
    /// Setup failed for another reason. Not retried; state stays `Starting`.
    Failed(ConnectError),
    /// Setup panicked. Contained here, never reaches the host.
    Panicked(String),
}

/// Handle to the supervised connection-setup task.
pub struct StartupHandle {
    inner: JoinHandle<StartupOutcome>,
}

impl StartupHandle {
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Wait for connection setup to finish.
    pub async fn wait(self) -> StartupOutcome {
        match self.inner.await {
            Ok(outcome) => outcome,
            Err(e) => StartupOutcome::Panicked(e.to_string()),
        }
    }
}

/// Owns the connection state and drives connection setup and shutdown.
pub struct LifecycleController {
    state: StateHandle,
    gateway: Arc<dyn Gateway>,
    host: Arc<dyn HostControl>,
    runtime: Handle,
    connect_timeout: Option<Duration>,
    started: AtomicBool,
}

impl LifecycleController {
    pub fn new(gateway: Arc<dyn Gateway>, host: Arc<dyn HostControl>, runtime: Handle) -> Self {
        Self {
            state: StateHandle::new(),
            gateway,
            host,
            runtime,
            connect_timeout: None,
            started: AtomicBool::new(false),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn state(&self) -> Option<ConnectionState> {
        self.state.get()
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.set(state);
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    /// Run `hook` the first time the gateway reports `Ready`.
    ///
    /// Runs immediately if that has already happened.
    pub fn on_ready(&self, hook: impl FnOnce() + Send + 'static) {
        self.state.on_first_ready(Box::new(hook));
    }

    /// Spawn connection setup and return without waiting for it.
    ///
    /// Only the first call does anything.
    pub fn start_connection(&self, options: ConnectOptions) -> Result<StartupHandle, StartError> {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::warn!("connection setup requested twice, ignoring");
            return Err(StartError::AlreadyStarted);
        }

        let gateway = self.gateway.clone();
        let state = self.state.clone();
        let timeout = self.connect_timeout;

        let setup = self.runtime.spawn(async move {
            tracing::info!("host is ready, starting connection");
            state.set(ConnectionState::Starting);
            let connect = gateway.connect(options, state);
            match timeout {
                Some(limit) => tokio::time::timeout(limit, connect)
                    .await
                    .unwrap_or(Err(ConnectError::TimedOut(limit))),
                None => connect.await,
            }
        });

        let host = self.host.clone();
        let supervisor = self.runtime.spawn(async move {
            match setup.await {
                Ok(Ok(())) => {
                    tracing::info!("gateway connection established");
                    StartupOutcome::Connected
                }
                Ok(Err(ConnectError::Authentication(reason))) => {
                    tracing::error!(%reason, "unable to start connection, token rejected");
                    tracing::error!("integration will be disabled");
                    host.disable_integration(&reason);
                    StartupOutcome::AuthenticationRejected(reason)
                }
                Ok(Err(error)) => {
                    tracing::error!(%error, "unable to start connection");
                    StartupOutcome::Failed(error)
                }
                Err(join) if join.is_panic() => {
                    let message = panic_message(join.into_panic());
                    tracing::error!(%message, "connection setup panicked");
                    StartupOutcome::Panicked(message)
                }
                Err(join) => {
                    tracing::error!(error = %join, "connection setup task was cancelled");
                    StartupOutcome::Panicked(join.to_string())
                }
            }
        });

        Ok(StartupHandle { inner: supervisor })
    }

    /// Close the connection if, and only if, it is ready.
    ///
    /// Returns whether the gateway was asked to close.
    pub async fn shutdown(&self) -> bool {
        match self.state() {
            Some(ConnectionState::Ready) => {
                tracing::info!("closing gateway connection");
                self.gateway.close().await;
                true
            }
            other => {
                tracing::debug!(state = ?other, "connection not established, nothing to close");
                false
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
