//! Configuration schema structs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub terminal: TerminalConfig,
    pub session: SessionConfig,
    /// Known users by nickname
    pub users: HashMap<String, UserConfig>,
    /// External programs the bundled menu can launch, by name
    pub doors: HashMap<String, DoorConfig>,
}

/// Listener and entry script
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the line transport listens on
    pub listen: String,
    /// Script run for every session
    pub entry_script: PathBuf,
    /// Nickname given to connections the transport did not authenticate
    pub guest_nickname: String,
    /// Shown when the session starts
    pub banner: String,
    /// Written before the connection is closed
    pub goodbye: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:2200".into(),
            entry_script: PathBuf::from("init.lua"),
            guest_nickname: "guest".into(),
            banner: "Welcome to atomic BBS\r\n".into(),
            goodbye: "\r\nGoodbye!\r\n".into(),
        }
    }
}

/// Per-connection terminal defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// utf8, cp437 or cp850
    pub output_mode: String,
    /// Characters accepted by a field capture (0 = unlimited)
    pub max_input_length: usize,
    /// Delay between output units in milliseconds (0 = none)
    pub output_delay_ms: u64,
    /// Byte written for characters the code page cannot represent
    pub unmapped_byte: u8,
    /// Give up on a field capture after this many seconds (0 = wait forever)
    pub input_timeout_secs: u64,
    /// Size assumed until the client reports one
    pub default_cols: u16,
    pub default_rows: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            output_mode: "utf8".into(),
            max_input_length: 80,
            output_delay_ms: 0,
            unmapped_byte: 0x00,
            input_timeout_secs: 0,
            default_cols: 80,
            default_rows: 24,
        }
    }
}

/// Session limits and timings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Environment entries accepted from the client
    pub max_env_entries: usize,
    /// Bytes per transport read
    pub read_buffer_size: usize,
    /// How often an external process is checked for a size change
    pub resize_poll_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_env_entries: atomic_protocol::DEFAULT_MAX_ENV_ENTRIES,
            read_buffer_size: 1024,
            resize_poll_ms: 100,
        }
    }
}

/// Groups of a known user
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UserConfig {
    pub groups: Vec<String>,
}

/// External program run inside a pseudo-terminal
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DoorConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Only members of this group may run it
    pub group: Option<String>,
}
