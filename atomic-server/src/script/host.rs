//! Functions a script can call
//!
//! [`ScriptHost`] is what an engine binds into its runtime: the terminal
//! namespace plus the session-level globals. Every call blocks the script
//! thread at most until the session closes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use atomic_utils::Result;

use crate::session::{Callback, Identity, Session};
use crate::terminal::Terminal;

/// Script-facing view of one session
#[derive(Clone)]
pub struct ScriptHost {
    session: Arc<Session>,
}

impl ScriptHost {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn terminal(&self) -> &Terminal {
        self.session.terminal()
    }

    // ==================== Terminal namespace ====================

    pub fn write(&self, text: &str) {
        self.terminal().write(text);
    }

    /// Write a CP437 art file
    pub fn write_from_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        self.terminal().write_from_file(path.as_ref())
    }

    pub fn cls(&self) {
        self.terminal().cls();
    }

    pub fn clear(&self) {
        self.terminal().clear();
    }

    pub fn draw_box(&self, row: i64, col: i64, width: i64, height: i64) {
        self.terminal().draw_box(row, col, width, height);
    }

    pub fn get_field(&self) -> Result<String> {
        self.terminal().get_field()
    }

    pub fn get_password(&self) -> Result<String> {
        self.terminal().get_password()
    }

    pub fn get_output_mode(&self) -> &'static str {
        self.terminal().get_output_mode()
    }

    pub fn set_output_mode(&self, name: &str) {
        self.terminal().set_output_mode(name);
    }

    /// (cols, rows)
    pub fn get_size(&self) -> (u16, u16) {
        self.terminal().size()
    }

    pub fn inline_image(&self, path: impl AsRef<Path>) -> Result<()> {
        self.terminal().inline_image(path.as_ref())
    }

    pub fn move_cursor(&self, row: i64, col: i64) {
        self.terminal().move_cursor(row, col);
    }

    pub fn print(&self, row: i64, col: i64, text: &str) {
        self.terminal().print(row, col, text);
    }

    pub fn print_multiple_lines(&self, row: i64, col: i64, text: &str) {
        self.terminal().print_multiple_lines(row, col, text);
    }

    pub fn reset_screen(&self) {
        self.terminal().reset_screen();
    }

    pub fn enter_screen(&self) {
        self.terminal().enter_screen();
    }

    pub fn exit_screen(&self) {
        self.terminal().exit_screen();
    }

    pub fn set_echo(&self, echo: bool) {
        self.terminal().set_echo(echo);
    }

    pub fn set_input_limit(&self, limit: usize) {
        self.terminal().set_input_limit(limit);
    }

    pub fn set_max_input_length(&self, limit: usize) {
        self.set_input_limit(limit);
    }

    pub fn set_output_delay(&self, ms: u64) {
        self.terminal().set_output_delay(ms);
    }

    // ==================== Session globals ====================

    /// Register a trigger and return its name
    pub fn trigger(&self, name: &str, callback: Arc<dyn Callback>) -> String {
        self.session.register_trigger(name, callback);
        name.to_string()
    }

    pub fn remove_trigger(&self, name: &str) {
        self.session.remove_trigger(name);
    }

    pub fn clear_triggers(&self) {
        self.session.clear_triggers();
    }

    /// Start a periodic callback. An empty name uses the default timer name.
    pub fn timer(&self, name: &str, interval_ms: u64, callback: Arc<dyn Callback>) {
        self.session
            .run_timer(name, Duration::from_millis(interval_ms), callback);
    }

    /// Run a program interactively; returns its exit code
    pub fn exec(&self, command: &str, args: &[String]) -> Result<i32> {
        self.session.exec(command, args)
    }

    /// Run a program in a PTY but leave input with triggers and the line
    /// editor; returns its exit code
    pub fn exec_with_triggers(&self, command: &str, args: &[String]) -> Result<i32> {
        self.session.exec_with_triggers(command, args)
    }

    /// Run a program without a terminal; returns and displays its stdout
    pub fn exec_non_interactive(&self, command: &str, args: &[String]) -> Result<String> {
        self.session.exec_captured(command, args)
    }

    /// Say goodbye and close the connection
    pub fn quit(&self) {
        self.session.shutdown();
    }

    /// Client environment variable, empty when unset
    pub fn get_env(&self, key: &str) -> String {
        self.session.env(key).unwrap_or_default()
    }

    /// Server working directory, empty if it cannot be determined
    pub fn current_directory(&self) -> String {
        match std::env::current_dir() {
            Ok(dir) => dir.display().to_string(),
            Err(e) => {
                warn!(error = %e, "Cannot determine current directory");
                String::new()
            }
        }
    }

    /// True for an existing path that is not a directory
    pub fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        std::fs::metadata(path.as_ref())
            .map(|meta| !meta.is_dir())
            .unwrap_or(false)
    }

    pub fn get_user(&self) -> &Identity {
        self.session.identity()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.session.identity().has_group(group)
    }

    /// File contents, or `None` (logged) when it cannot be read
    pub fn read_file(&self, path: impl AsRef<Path>) -> Option<String> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) => {
                warn!(
                    session_id = %self.session.id(),
                    path = %path.display(),
                    error = %e,
                    "Script could not read file"
                );
                None
            }
        }
    }

    pub fn log(&self, message: &str) {
        info!(
            session_id = %self.session.id(),
            nickname = %self.session.identity().nickname,
            "{}",
            message
        );
    }
}

impl std::fmt::Debug for ScriptHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHost")
            .field("session", &self.session.id())
            .finish()
    }
}
