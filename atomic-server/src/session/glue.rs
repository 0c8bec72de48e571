//! Channel requests and the entry script lifecycle

use std::sync::Arc;

use atomic_protocol::ChannelRequest;
use tracing::{debug, error, info, warn};

use atomic_utils::{AtomicError, Result};

use super::Session;
use crate::script::ScriptHost;

impl Session {
    /// Apply an out-of-band request from the client. An `Err` means the
    /// request was rejected; the session carries on either way.
    pub fn apply_request(self: &Arc<Self>, request: ChannelRequest) -> Result<()> {
        match request {
            ChannelRequest::PtyReq { term, cols, rows } => {
                debug!(session_id = %self.id, term = %term, cols, rows, "PTY requested");
                if !term.is_empty() {
                    self.state.set_term(term);
                }
                self.resize(cols, rows);
                Ok(())
            }
            ChannelRequest::WindowChange { cols, rows } => {
                self.resize(cols, rows);
                Ok(())
            }
            ChannelRequest::Env { key, value } => {
                self.state.set_env(key, value).map_err(|e| {
                    warn!(session_id = %self.id, error = %e, "Environment variable rejected");
                    e
                })
            }
            ChannelRequest::Shell => self.start_shell(),
            ChannelRequest::Subsystem { name } => {
                warn!(session_id = %self.id, subsystem = %name, "Subsystem not supported");
                Err(AtomicError::InvalidRequest(format!(
                    "subsystem {} not supported",
                    name
                )))
            }
            ChannelRequest::Other { kind } => Err(AtomicError::InvalidRequest(format!(
                "unsupported request {}",
                kind
            ))),
        }
    }

    fn resize(&self, cols: u32, rows: u32) {
        let cols = u16::try_from(cols).unwrap_or(u16::MAX);
        let rows = u16::try_from(rows).unwrap_or(u16::MAX);
        self.terminal.set_size(cols, rows);
        debug!(session_id = %self.id, cols, rows, "Window size changed");
    }

    /// Start the entry script on a blocking thread. The session shuts down
    /// when it returns.
    pub fn start_shell(self: &Arc<Self>) -> Result<()> {
        if !self.state.mark_shell_started() {
            return Err(AtomicError::InvalidRequest("shell already started".into()));
        }

        let session = Arc::clone(self);
        self.runtime.spawn_blocking(move || session.run_entry_script());
        Ok(())
    }

    fn run_entry_script(self: Arc<Self>) {
        info!(
            session_id = %self.id,
            script = %self.scripts.path().display(),
            "Entry script starting"
        );

        let result = self
            .scripts
            .get_or_compile()
            .and_then(|script| script.run(&ScriptHost::new(Arc::clone(&self))));

        match result {
            Ok(()) => info!(session_id = %self.id, "Entry script finished"),
            Err(AtomicError::SessionClosed) => {
                debug!(session_id = %self.id, "Entry script ended with the session")
            }
            Err(e) => error!(session_id = %self.id, error = %e, "Entry script failed"),
        }

        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use crate::session::tests::test_session;
    use crate::terminal::tests::drain;
    use atomic_protocol::ChannelRequest;
    use atomic_utils::AtomicError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pty_request_sets_size_and_term() {
        let (session, _rx) = test_session();
        session
            .apply_request(ChannelRequest::PtyReq {
                term: "vt100".into(),
                cols: 132,
                rows: 43,
            })
            .unwrap();

        assert_eq!(session.terminal().size(), (132, 43));
        assert_eq!(session.term().as_deref(), Some("vt100"));
    }

    #[tokio::test]
    async fn test_window_change_saturates() {
        let (session, _rx) = test_session();
        session
            .apply_request(ChannelRequest::WindowChange {
                cols: 100_000,
                rows: 50,
            })
            .unwrap();
        assert_eq!(session.terminal().size(), (u16::MAX, 50));
    }

    #[tokio::test]
    async fn test_env_request_respects_cap() {
        let mut config = crate::config::AppConfig::default();
        config.session.max_env_entries = 1;
        let (session, _rx) = crate::session::tests::test_session_with(config);

        let env = |key: &str| ChannelRequest::Env {
            key: key.into(),
            value: "1".into(),
        };
        session.apply_request(env("A")).unwrap();
        let result = session.apply_request(env("B"));
        assert!(matches!(result, Err(AtomicError::EnvironmentFull { limit: 1 })));
        assert_eq!(session.env("B"), None);
    }

    #[tokio::test]
    async fn test_unsupported_requests_rejected() {
        let (session, _rx) = test_session();
        assert!(session
            .apply_request(ChannelRequest::Subsystem { name: "sftp".into() })
            .is_err());
        assert!(session
            .apply_request(ChannelRequest::Other {
                kind: "x11-req".into()
            })
            .is_err());
        assert!(session.is_connected());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shell_runs_entry_script_once() {
        let (session, mut rx) = test_session();
        session.apply_request(ChannelRequest::Shell).unwrap();
        assert!(session.apply_request(ChannelRequest::Shell).is_err());

        // The bundled menu prompts for a line; closing input ends it
        for _ in 0..200 {
            if session.terminal().is_capturing() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(session.terminal().is_capturing());

        session.terminal().input("quit\r");
        for _ in 0..200 {
            if !session.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!session.is_connected());

        let out = String::from_utf8_lossy(&drain(&mut rx)).into_owned();
        assert!(out.contains("Welcome"));
        assert!(out.contains("Goodbye!"));
    }
}
