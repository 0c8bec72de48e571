//! Per-session flags, identity and client environment

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use atomic_utils::{AtomicError, Result};

use crate::config::UserConfig;

/// Who is on the other end of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub nickname: String,
    pub groups: Vec<String>,
}

impl Identity {
    pub fn new(nickname: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            nickname: nickname.into(),
            groups,
        }
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Maps an authenticated nickname to an identity
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, nickname: &str) -> Identity;
}

/// Resolves groups from the `[users]` config section.
/// Unknown nicknames get no groups.
#[derive(Debug, Clone, Default)]
pub struct ConfigIdentityResolver {
    users: HashMap<String, UserConfig>,
}

impl ConfigIdentityResolver {
    pub fn new(users: HashMap<String, UserConfig>) -> Self {
        Self { users }
    }
}

impl IdentityResolver for ConfigIdentityResolver {
    fn resolve(&self, nickname: &str) -> Identity {
        let groups = self
            .users
            .get(nickname)
            .map(|user| user.groups.clone())
            .unwrap_or_default();
        Identity::new(nickname, groups)
    }
}

/// Environment variables sent by the client, capped in size
#[derive(Debug, Clone)]
pub struct Environment {
    entries: HashMap<String, String>,
    limit: usize,
}

impl Environment {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            limit,
        }
    }

    /// Set a variable. Replacing an existing key is always allowed; a new
    /// key is rejected once the limit is reached.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.limit {
            return Err(AtomicError::EnvironmentFull { limit: self.limit });
        }
        self.entries.insert(key, value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Copy of all entries
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Mutable session state shared between the reader, the script thread and
/// the process bridge
#[derive(Debug)]
pub struct SessionState {
    connected: AtomicBool,
    external_exec: AtomicBool,
    shell_started: AtomicBool,
    env: Mutex<Environment>,
    /// Terminal type from the client's pty request
    term: Mutex<Option<String>>,
}

impl SessionState {
    pub fn new(env_limit: usize) -> Self {
        Self {
            connected: AtomicBool::new(true),
            external_exec: AtomicBool::new(false),
            shell_started: AtomicBool::new(false),
            env: Mutex::new(Environment::new(env_limit)),
            term: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Mark disconnected, returning whether the session was connected
    pub fn mark_disconnected(&self) -> bool {
        self.connected.swap(false, Ordering::SeqCst)
    }

    pub fn is_exec_active(&self) -> bool {
        self.external_exec.load(Ordering::SeqCst)
    }

    pub fn set_exec_active(&self, active: bool) {
        self.external_exec.store(active, Ordering::SeqCst);
    }

    /// Returns false if the shell was already started
    pub fn mark_shell_started(&self) -> bool {
        !self.shell_started.swap(true, Ordering::SeqCst)
    }

    pub fn set_env(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.env.lock().set(key, value)
    }

    pub fn env(&self, key: &str) -> Option<String> {
        self.env.lock().get(key).map(str::to_string)
    }

    pub fn env_snapshot(&self) -> Vec<(String, String)> {
        self.env.lock().snapshot()
    }

    pub fn set_term(&self, term: impl Into<String>) {
        *self.term.lock() = Some(term.into());
    }

    pub fn term(&self) -> Option<String> {
        self.term.lock().clone()
    }
}
