//! Inbound chunk routing: process bridge, triggers, then the line editor

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::{debug, error, info, trace, warn};

use atomic_utils::{AtomicError, Result};

use super::{Callback, Inbound, Session};

impl Session {
    /// Register or replace the trigger fired by an input chunk equal to `name`
    pub fn register_trigger(&self, name: impl Into<String>, callback: Arc<dyn Callback>) {
        let name = name.into();
        trace!(session_id = %self.id, trigger = ?name, "Trigger registered");
        self.triggers.register(name, callback);
    }

    pub fn remove_trigger(&self, name: &str) -> bool {
        self.triggers.remove(name)
    }

    /// Remove every trigger. Running timers stop on their next tick.
    pub fn clear_triggers(&self) {
        self.triggers.clear();
    }

    /// Fire the trigger whose name equals the whole chunk, or hand the chunk
    /// to the terminal. Returns whether a trigger fired.
    ///
    /// Blocks for as long as the callback runs.
    pub fn dispatch(&self, chunk: &[u8]) -> Result<bool> {
        if let Ok(key) = std::str::from_utf8(chunk) {
            if let Some(callback) = self.triggers.get(key) {
                trace!(session_id = %self.id, trigger = ?key, "Trigger fired");
                callback.invoke(key).map_err(|e| match e {
                    AtomicError::Callback { .. } => e,
                    other => AtomicError::callback(key, other.to_string()),
                })?;
                return Ok(true);
            }
        }

        self.terminal.input_bytes(chunk);
        Ok(false)
    }

    /// Read the transport until it ends, the session shuts down, or a
    /// trigger callback fails. Disconnects the session on the way out.
    pub async fn run_reader<S>(self: Arc<Self>, mut inbound: S) -> Result<()>
    where
        S: Stream<Item = Result<Inbound>> + Unpin,
    {
        info!(session_id = %self.id, "Session reader started");

        let result = loop {
            let item = tokio::select! {
                _ = self.shutdown.cancelled() => break Ok(()),
                item = inbound.next() => item,
            };

            match item {
                None => {
                    debug!(session_id = %self.id, "Transport closed by client");
                    break Ok(());
                }
                Some(Err(AtomicError::InvalidRequest(reason))) => {
                    debug!(session_id = %self.id, reason = %reason, "Malformed request rejected");
                }
                Some(Err(e)) => {
                    warn!(session_id = %self.id, error = %e, "Transport read failed");
                    break Err(e);
                }
                Some(Ok(Inbound::Request(request))) => {
                    let kind = request.kind().to_string();
                    if let Err(e) = self.apply_request(request) {
                        debug!(session_id = %self.id, request = %kind, error = %e, "Request rejected");
                    }
                }
                Some(Ok(Inbound::Data(chunk))) => {
                    let Some(chunk) = self.route_to_process(chunk) else {
                        continue;
                    };

                    let session = Arc::clone(&self);
                    match tokio::task::spawn_blocking(move || session.dispatch(&chunk)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => {
                            error!(session_id = %self.id, error = %e, "Trigger callback failed, closing session");
                            break Err(e);
                        }
                        Err(e) => {
                            error!(session_id = %self.id, error = %e, "Dispatch task failed");
                            break Err(AtomicError::internal(e.to_string()));
                        }
                    }
                }
            }
        };

        self.disconnect();
        info!(session_id = %self.id, "Session reader stopped");
        result
    }
}
