//! Configuration loader

use std::path::Path;

use atomic_utils::{config_file, AtomicError, Result};

use super::AppConfig;
use crate::terminal::OutputMode;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default location
    pub fn load() -> Result<AppConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(AppConfig::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<AppConfig> {
        if !path.exists() {
            return Err(AtomicError::ConfigNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| AtomicError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<AppConfig> {
        toml::from_str(content).map_err(|e| AtomicError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        if OutputMode::parse(&config.terminal.output_mode).is_none() {
            return Err(AtomicError::config(format!(
                "output_mode must be utf8, cp437 or cp850 (got {:?})",
                config.terminal.output_mode
            )));
        }

        if config.session.max_env_entries == 0 {
            return Err(AtomicError::config("max_env_entries must be at least 1"));
        }

        if config.session.read_buffer_size == 0 {
            return Err(AtomicError::config("read_buffer_size must be at least 1"));
        }

        if config.session.resize_poll_ms == 0 {
            return Err(AtomicError::config("resize_poll_ms must be at least 1"));
        }

        for (name, door) in &config.doors {
            if door.command.is_empty() {
                return Err(AtomicError::config(format!(
                    "door {} has no command",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Load from `path` (or the default location) and validate
    pub fn load_and_validate(path: Option<&Path>) -> Result<AppConfig> {
        let config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::load()?,
        };
        Self::validate(&config)?;
        Ok(config)
    }
}
