//! Per-connection session
//!
//! A session ties a [`Terminal`] to the trigger registry, timers, the
//! external process bridge and the entry script. The transport feeds it
//! [`Inbound`] items through [`Session::run_reader`].

mod dispatcher;
mod glue;
mod state;
mod timer;
mod triggers;

pub use state::{ConfigIdentityResolver, Environment, Identity, IdentityResolver, SessionState};
pub use timer::DEFAULT_TIMER_NAME;
pub use triggers::{Callback, TriggerRegistry};

use std::sync::Arc;
use std::time::Duration;

use atomic_protocol::ChannelRequest;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use atomic_utils::{AtomicError, Result};

use crate::config::AppConfig;
use crate::pty::ProcessBridge;
use crate::script::ScriptCache;
use crate::terminal::{OutputSink, Terminal};

/// Item read from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Raw input bytes as one chunk
    Data(Bytes),
    /// Out-of-band channel request
    Request(ChannelRequest),
}

impl Inbound {
    /// Decode a channel request from its wire kind and payload. A malformed
    /// payload is an `InvalidRequest`, which the reader rejects without
    /// ending the session.
    pub fn request(kind: &str, payload: &[u8]) -> Result<Self> {
        ChannelRequest::parse(kind, payload)
            .map(Self::Request)
            .map_err(|e| AtomicError::InvalidRequest(e.to_string()))
    }
}

/// One connected user
pub struct Session {
    id: Uuid,
    identity: Identity,
    terminal: Arc<Terminal>,
    triggers: TriggerRegistry,
    state: SessionState,
    bridge: ProcessBridge,
    /// Present while an external process owns the input
    exec_route: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    shutdown: CancellationToken,
    runtime: Handle,
    config: Arc<AppConfig>,
    scripts: Arc<ScriptCache>,
}

impl Session {
    /// Create a session writing to `sink`.
    ///
    /// Must be called from within a tokio runtime; timers and relays are
    /// spawned on it.
    pub fn new(
        identity: Identity,
        sink: OutputSink,
        config: Arc<AppConfig>,
        scripts: Arc<ScriptCache>,
    ) -> Arc<Self> {
        let terminal = Arc::new(Terminal::new(sink, &config.terminal));
        let resize_poll = Duration::from_millis(config.session.resize_poll_ms);

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            identity,
            terminal,
            triggers: TriggerRegistry::new(),
            state: SessionState::new(config.session.max_env_entries),
            bridge: ProcessBridge::new(resize_poll),
            exec_route: Mutex::new(None),
            shutdown: CancellationToken::new(),
            runtime: Handle::current(),
            config,
            scripts,
        });

        debug!(
            session_id = %session.id,
            nickname = %session.identity.nickname,
            "Session created"
        );
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn terminal(&self) -> &Arc<Terminal> {
        &self.terminal
    }

    pub fn triggers(&self) -> &TriggerRegistry {
        &self.triggers
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn bridge(&self) -> &ProcessBridge {
        &self.bridge
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Cancelled when the session shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    // ==================== Environment ====================

    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.state.set_env(key, value)
    }

    pub fn env(&self, key: &str) -> Option<String> {
        self.state.env(key)
    }

    pub fn env_snapshot(&self) -> Vec<(String, String)> {
        self.state.env_snapshot()
    }

    /// Terminal type reported by the client
    pub fn term(&self) -> Option<String> {
        self.state.term()
    }

    // ==================== External processes ====================

    /// Run a program in a PTY, blocking until it exits
    pub fn exec(self: &Arc<Self>, command: &str, args: &[String]) -> Result<i32> {
        self.bridge.exec(self, command, args)
    }

    /// Run a program in a PTY while input keeps going to triggers and the
    /// line editor
    pub fn exec_with_triggers(self: &Arc<Self>, command: &str, args: &[String]) -> Result<i32> {
        self.bridge.exec_with_triggers(self, command, args)
    }

    /// Run a program without a PTY and return its stdout
    pub fn exec_captured(&self, command: &str, args: &[String]) -> Result<String> {
        self.bridge.exec_captured(self, command, args)
    }

    pub fn is_exec_active(&self) -> bool {
        self.state.is_exec_active()
    }

    pub(crate) fn begin_exec(&self, route: mpsc::UnboundedSender<Bytes>) {
        *self.exec_route.lock() = Some(route);
        self.state.set_exec_active(true);
    }

    pub(crate) fn end_exec(&self) {
        self.state.set_exec_active(false);
        self.exec_route.lock().take();
    }

    /// Hand a chunk to the running process. Returns the chunk back when no
    /// process takes it.
    pub(crate) fn route_to_process(&self, chunk: Bytes) -> Option<Bytes> {
        let route = self.exec_route.lock();
        match route.as_ref() {
            Some(tx) => match tx.send(chunk) {
                Ok(()) => None,
                Err(mpsc::error::SendError(chunk)) => Some(chunk),
            },
            None => Some(chunk),
        }
    }

    // ==================== Lifecycle ====================

    /// Say goodbye and close the session
    pub fn shutdown(&self) {
        if self.state.is_connected() {
            self.terminal.write(&self.config.server.goodbye);
        }
        self.disconnect();
    }

    /// Close the session without a goodbye. Safe to call more than once.
    pub fn disconnect(&self) {
        let was_connected = self.state.mark_disconnected();

        self.shutdown.cancel();
        self.terminal.close_input();
        self.triggers.clear();
        self.terminal.close();

        if was_connected {
            info!(
                session_id = %self.id,
                nickname = %self.identity.nickname,
                "Session disconnected"
            );
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("connected", &self.state.is_connected())
            .finish_non_exhaustive()
    }
}
