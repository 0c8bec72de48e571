//! Error types for atomic
//!
//! Provides the unified error type used across the atomic crates.

use std::path::PathBuf;

/// Main error type for atomic operations
#[derive(Debug, thiserror::Error)]
pub enum AtomicError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Transport Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    // === Session Errors ===

    #[error("Session closed")]
    SessionClosed,

    #[error("An input capture is already in progress")]
    CaptureBusy,

    #[error("Input timed out after {seconds}s")]
    InputTimeout { seconds: u64 },

    #[error("Environment is full ({limit} entries)")]
    EnvironmentFull { limit: usize },

    // === Process Errors ===

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("Failed to spawn process: {0}")]
    ProcessSpawn(String),

    #[error("An external process is already running in this session")]
    ExecBusy,

    // === Script Errors ===

    #[error("Script error: {0}")]
    Script(String),

    #[error("Callback {name} failed: {message}")]
    Callback { name: String, message: String },

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AtomicError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a PTY error
    pub fn pty(msg: impl Into<String>) -> Self {
        Self::Pty(msg.into())
    }

    /// Create a script error
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }

    /// Create a callback error for the named trigger or timer
    pub fn callback(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Callback {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error means the connection can no longer be used.
    ///
    /// Protocol, configuration and callback failures are scoped to the
    /// request or task that raised them.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Connection(_) | Self::ConnectionClosed | Self::SessionClosed
        )
    }
}

/// Result type alias using AtomicError
pub type Result<T> = std::result::Result<T, AtomicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AtomicError::ExecBusy;
        assert_eq!(
            err.to_string(),
            "An external process is already running in this session"
        );
    }

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = AtomicError::FileRead {
            path: PathBuf::from("/srv/bbs/art.ans"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/srv/bbs/art.ans"));
    }

    #[test]
    fn test_error_display_config_invalid() {
        let err = AtomicError::ConfigInvalid {
            path: PathBuf::from("/home/user/.config/atomic/config.toml"),
            message: "syntax error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("config.toml"));
        assert!(msg.contains("syntax error"));
    }

    #[test]
    fn test_error_display_input_timeout() {
        let err = AtomicError::InputTimeout { seconds: 30 };
        assert_eq!(err.to_string(), "Input timed out after 30s");
    }

    #[test]
    fn test_error_display_environment_full() {
        let err = AtomicError::EnvironmentFull { limit: 1000 };
        assert_eq!(err.to_string(), "Environment is full (1000 entries)");
    }

    #[test]
    fn test_callback_helper() {
        let err = AtomicError::callback("ping", "attempt to call a nil value");
        assert!(matches!(err, AtomicError::Callback { .. }));
        assert_eq!(
            err.to_string(),
            "Callback ping failed: attempt to call a nil value"
        );
    }

    #[test]
    fn test_helpers() {
        assert_eq!(
            AtomicError::protocol("short payload").to_string(),
            "Protocol error: short payload"
        );
        assert_eq!(
            AtomicError::pty("no devices").to_string(),
            "PTY error: no devices"
        );
        assert_eq!(
            AtomicError::config("bad listen").to_string(),
            "Configuration error: bad listen"
        );
        assert_eq!(
            AtomicError::script("syntax").to_string(),
            "Script error: syntax"
        );
        assert_eq!(
            AtomicError::connection("reset").to_string(),
            "Connection failed: reset"
        );
        assert_eq!(
            AtomicError::internal("oops").to_string(),
            "Internal error: oops"
        );
    }

    #[test]
    fn test_transport_errors_end_session() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(AtomicError::Io(io_err).ends_session());
        assert!(AtomicError::ConnectionClosed.ends_session());
        assert!(AtomicError::SessionClosed.ends_session());
    }

    #[test]
    fn test_scoped_errors_do_not_end_session() {
        let scoped = [
            AtomicError::InvalidRequest("env".into()),
            AtomicError::Protocol("frame".into()),
            AtomicError::Config("mode".into()),
            AtomicError::callback("tick", "boom"),
            AtomicError::ExecBusy,
            AtomicError::ProcessSpawn("not found".into()),
            AtomicError::EnvironmentFull { limit: 1 },
            AtomicError::CaptureBusy,
        ];

        for err in scoped {
            assert!(!err.ends_session(), "Expected {:?} to be scoped", err);
        }
    }

    #[test]
    fn test_from_io_error_preserves_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AtomicError = io_err.into();
        if let AtomicError::Io(inner) = err {
            assert_eq!(inner.kind(), std::io::ErrorKind::PermissionDenied);
        } else {
            panic!("Expected Io variant");
        }
    }
}
