//! Launch settings for a process run inside a pseudo-terminal

use std::collections::HashMap;

/// Configuration for spawning a PTY
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Program to execute
    pub command: String,
    pub args: Vec<String>,
    /// Variables added to the inherited environment
    pub env: HashMap<String, String>,
    /// Initial terminal size (cols, rows)
    pub size: (u16, u16),
}

impl PtyConfig {
    /// Create config for a specific command
    pub fn command(cmd: impl Into<String>) -> Self {
        Self {
            command: cmd.into(),
            args: Vec::new(),
            env: HashMap::new(),
            size: (80, 24),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set initial size. A zero dimension is raised to 1.
    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.size = (cols.max(1), rows.max(1));
        self
    }
}
