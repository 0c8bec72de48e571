//! Runs an external program inside a PTY and bridges it to a session
//!
//! While a program runs, the session's inbound bytes are routed to the PTY
//! instead of the trigger dispatcher, PTY output goes to the terminal, and
//! window size changes are forwarded to the PTY. A program started with
//! triggers kept live leaves input on the dispatcher path instead.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::{mpsc as std_mpsc, Arc};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use atomic_utils::{AtomicError, Result};

use super::{PtyConfig, PtyHandle};
use crate::session::Session;
use crate::terminal::Utf8Decoder;

/// How often the exec thread checks whether the child has exited
const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long trailing output may take to reach the terminal after exit
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

const READ_CHUNK_SIZE: usize = 4096;

/// Where session input goes while a program runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    /// Straight to the PTY
    Routed,
    /// Through triggers and the line editor, as without a program
    Dispatched,
}

/// At most one external program per session
#[derive(Debug)]
pub struct ProcessBridge {
    busy: Mutex<()>,
    resize_poll: Duration,
}

impl ProcessBridge {
    pub fn new(resize_poll: Duration) -> Self {
        Self {
            busy: Mutex::new(()),
            resize_poll,
        }
    }

    /// True while a program started by [`exec`](Self::exec) or
    /// [`exec_with_triggers`](Self::exec_with_triggers) is running
    pub fn is_active(&self) -> bool {
        self.busy.is_locked()
    }

    /// Run `command` interactively and block until it exits.
    ///
    /// Returns the exit code. A program that cannot be started is logged and
    /// returned as an error without taking over the session's input.
    pub fn exec(&self, session: &Arc<Session>, command: &str, args: &[String]) -> Result<i32> {
        self.run(session, command, args, InputMode::Routed)
    }

    /// Like [`exec`](Self::exec), but session input keeps flowing through
    /// the trigger dispatcher and the line editor. The program sees no
    /// keystrokes; only its output and the window size are bridged.
    pub fn exec_with_triggers(
        &self,
        session: &Arc<Session>,
        command: &str,
        args: &[String],
    ) -> Result<i32> {
        self.run(session, command, args, InputMode::Dispatched)
    }

    fn run(
        &self,
        session: &Arc<Session>,
        command: &str,
        args: &[String],
        input: InputMode,
    ) -> Result<i32> {
        let _busy = self.busy.try_lock().ok_or(AtomicError::ExecBusy)?;

        let (cols, rows) = session.terminal().size();
        let mut config = PtyConfig::command(command)
            .with_args(args.iter().cloned())
            .with_size(cols, rows);
        for (key, value) in session.env_snapshot() {
            config = config.with_env(key, value);
        }
        if let Some(term) = session.term() {
            config = config.with_env("TERM", term);
        }

        let handle = match PtyHandle::spawn(&config) {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                warn!(
                    session_id = %session.id(),
                    command = %command,
                    error = %e,
                    "Failed to start external process"
                );
                return Err(e);
            }
        };

        info!(
            session_id = %session.id(),
            command = %command,
            cols,
            rows,
            input = ?input,
            "External process started"
        );

        if input == InputMode::Routed {
            let (route_tx, route_rx) = mpsc::unbounded_channel();
            session.begin_exec(route_tx);
            spawn_input_relay(session, &handle, route_rx);
        }

        let stop = session.shutdown_token().child_token();
        let (done_tx, done_rx) = std_mpsc::channel();
        spawn_output_relay(session, &handle, done_tx);
        spawn_resize_watcher(session, &handle, self.resize_poll, (cols, rows), stop.clone());

        let exit_code = wait_for_exit(session, &handle);

        stop.cancel();
        if input == InputMode::Routed {
            session.end_exec();
        }
        if done_rx.recv_timeout(OUTPUT_DRAIN_TIMEOUT).is_err() {
            debug!(session_id = %session.id(), "Output relay still running after exit");
        }

        info!(
            session_id = %session.id(),
            command = %command,
            exit_code,
            "External process exited"
        );
        Ok(exit_code)
    }

    /// Run `command` without a PTY, write its stdout to the terminal and
    /// return it. Anything on stderr is logged.
    pub fn exec_captured(&self, session: &Session, command: &str, args: &[String]) -> Result<String> {
        let output = Command::new(command)
            .args(args)
            .envs(session.env_snapshot())
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                warn!(
                    session_id = %session.id(),
                    command = %command,
                    error = %e,
                    "Failed to run process"
                );
                AtomicError::ProcessSpawn(format!("{}: {}", command, e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        session.terminal().write(&stdout);

        if !output.stderr.is_empty() {
            warn!(
                session_id = %session.id(),
                command = %command,
                stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
                "Process wrote to stderr"
            );
        }

        debug!(
            session_id = %session.id(),
            command = %command,
            status = ?output.status.code(),
            bytes = stdout.len(),
            "Captured process finished"
        );
        Ok(stdout)
    }
}

/// PTY output to the terminal until EOF. Signals `done` when finished.
fn spawn_output_relay(session: &Arc<Session>, handle: &PtyHandle, done: std_mpsc::Sender<()>) {
    let runtime = session.runtime().clone();
    let session = Arc::clone(session);
    let reader = handle.clone_reader();

    runtime.spawn_blocking(move || {
        let mut decoder = Utf8Decoder::new();
        let mut buf = [0u8; READ_CHUNK_SIZE];

        loop {
            let n = match reader.lock().read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    // EIO once the child is gone
                    debug!(session_id = %session.id(), error = %e, "PTY read ended");
                    break;
                }
            };
            session.terminal().write_process_output(&mut decoder, &buf[..n]);
        }

        debug!(session_id = %session.id(), "Output relay finished");
        let _ = done.send(());
    });
}

/// Routed session input to the PTY. A chunk that cannot be written goes
/// back through the dispatcher and the relay stops.
fn spawn_input_relay(
    session: &Arc<Session>,
    handle: &Arc<PtyHandle>,
    mut route: mpsc::UnboundedReceiver<Bytes>,
) {
    let runtime = session.runtime().clone();
    let session = Arc::clone(session);
    let handle = Arc::clone(handle);

    runtime.spawn_blocking(move || {
        while let Some(chunk) = route.blocking_recv() {
            if let Err(e) = handle.write_all(&chunk) {
                debug!(session_id = %session.id(), error = %e, "PTY write failed");
                if let Err(e) = session.dispatch(&chunk) {
                    warn!(session_id = %session.id(), error = %e, "Dispatch of unrouted input failed");
                }
                break;
            }
        }
        debug!(session_id = %session.id(), "Input relay finished");
    });
}

/// Forward terminal size changes to the PTY until `stop` is cancelled
fn spawn_resize_watcher(
    session: &Arc<Session>,
    handle: &Arc<PtyHandle>,
    poll: Duration,
    initial: (u16, u16),
    stop: CancellationToken,
) -> JoinHandle<()> {
    let runtime = session.runtime().clone();
    let session = Arc::clone(session);
    let handle = Arc::clone(handle);

    runtime.spawn(async move {
        let mut ticker = tokio::time::interval(poll);
        let mut last = initial;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let size = session.terminal().size();
            if size != last {
                match handle.resize(size.0, size.1) {
                    Ok(()) => debug!(
                        session_id = %session.id(),
                        cols = size.0,
                        rows = size.1,
                        "PTY resized"
                    ),
                    Err(e) => warn!(session_id = %session.id(), error = %e, "PTY resize failed"),
                }
                last = size;
            }
        }
    })
}

/// Poll the child until it exits, killing it if the session shuts down
fn wait_for_exit(session: &Session, handle: &PtyHandle) -> i32 {
    let shutdown = session.shutdown_token();
    let mut killed = false;

    loop {
        match handle.try_wait() {
            Ok(Some(code)) => return code,
            Ok(None) => {}
            Err(e) => {
                warn!(session_id = %session.id(), error = %e, "Lost track of external process");
                return -1;
            }
        }

        if shutdown.is_cancelled() && !killed {
            debug!(session_id = %session.id(), "Session closing, killing external process");
            if let Err(e) = handle.kill() {
                warn!(session_id = %session.id(), error = %e, "Kill failed");
            }
            killed = true;
        }

        std::thread::sleep(CHILD_POLL_INTERVAL);
    }
}
