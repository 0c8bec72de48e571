//! Scripting engine boundary
//!
//! An engine compiles the entry script once per server; every session runs
//! the compiled script against its own [`ScriptHost`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use atomic_utils::{AtomicError, Result};

use super::ScriptHost;
use crate::terminal::decode_cp437;

/// Turns entry script source into something runnable
pub trait ScriptEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn compile(&self, path: &Path, source: &str) -> Result<Arc<dyn EntryScript>>;
}

/// A compiled entry script. `run` blocks for the life of the session.
pub trait EntryScript: Send + Sync {
    fn run(&self, host: &ScriptHost) -> Result<()>;
}

/// Compile-once cache of the entry script
pub struct ScriptCache {
    engine: Arc<dyn ScriptEngine>,
    path: PathBuf,
    /// Source used when `path` does not exist
    fallback: Option<String>,
    compiled: Mutex<Option<Arc<dyn EntryScript>>>,
}

impl ScriptCache {
    pub fn new(engine: Arc<dyn ScriptEngine>, path: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            path: path.into(),
            fallback: None,
            compiled: Mutex::new(None),
        }
    }

    pub fn with_fallback(mut self, source: impl Into<String>) -> Self {
        self.fallback = Some(source.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.lock().is_some()
    }

    /// Compiled script, compiling on first use. Failures are not cached.
    pub fn get_or_compile(&self) -> Result<Arc<dyn EntryScript>> {
        let mut compiled = self.compiled.lock();
        if let Some(script) = compiled.as_ref() {
            return Ok(Arc::clone(script));
        }

        let source = self.load_source()?;
        let script = self.engine.compile(&self.path, &source)?;
        info!(
            engine = self.engine.name(),
            path = %self.path.display(),
            "Entry script compiled"
        );

        *compiled = Some(Arc::clone(&script));
        Ok(script)
    }

    /// Script text. Files that are not UTF-8 are read as CP437.
    fn load_source(&self) -> Result<String> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(String::from_utf8(bytes)
                .unwrap_or_else(|e| decode_cp437(e.as_bytes()))),
            Err(e) if e.kind() == ErrorKind::NotFound && self.fallback.is_some() => {
                debug!(path = %self.path.display(), "Entry script missing, using fallback");
                Ok(self.fallback.clone().unwrap_or_default())
            }
            Err(source) => Err(AtomicError::FileRead {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl std::fmt::Debug for ScriptCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptCache")
            .field("engine", &self.engine.name())
            .field("path", &self.path)
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct Noop;

    impl EntryScript for Noop {
        fn run(&self, _host: &ScriptHost) -> Result<()> {
            Ok(())
        }
    }

    /// Counts compiles and remembers the last source
    #[derive(Default)]
    struct Recording {
        compiles: AtomicUsize,
        last_source: Mutex<String>,
    }

    impl ScriptEngine for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn compile(&self, _path: &Path, source: &str) -> Result<Arc<dyn EntryScript>> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            *self.last_source.lock() = source.to_string();
            if source.contains("syntax error") {
                return Err(AtomicError::script("unexpected symbol"));
            }
            Ok(Arc::new(Noop))
        }
    }

    #[test]
    fn test_compiles_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("init.lua");
        std::fs::write(&path, "print('hi')").unwrap();

        let engine = Arc::new(Recording::default());
        let cache = ScriptCache::new(engine.clone(), &path);

        assert!(!cache.is_compiled());
        cache.get_or_compile().unwrap();
        cache.get_or_compile().unwrap();

        assert!(cache.is_compiled());
        assert_eq!(engine.compiles.load(Ordering::SeqCst), 1);
        assert_eq!(*engine.last_source.lock(), "print('hi')");
    }

    #[test]
    fn test_compile_errors_are_not_cached() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("init.lua");
        std::fs::write(&path, "syntax error").unwrap();

        let engine = Arc::new(Recording::default());
        let cache = ScriptCache::new(engine.clone(), &path);

        assert!(matches!(cache.get_or_compile(), Err(AtomicError::Script(_))));
        std::fs::write(&path, "fixed").unwrap();
        assert!(cache.get_or_compile().is_ok());
        assert_eq!(engine.compiles.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_file_without_fallback() {
        let cache = ScriptCache::new(Arc::new(Recording::default()), "/nonexistent/init.lua");
        assert!(matches!(
            cache.get_or_compile(),
            Err(AtomicError::FileRead { .. })
        ));
    }

    #[test]
    fn test_missing_file_uses_fallback() {
        let engine = Arc::new(Recording::default());
        let cache = ScriptCache::new(engine.clone(), "/nonexistent/init.lua")
            .with_fallback("Welcome");

        cache.get_or_compile().unwrap();
        assert_eq!(*engine.last_source.lock(), "Welcome");
    }

    #[test]
    fn test_non_utf8_source_read_as_cp437() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("art.ans");
        std::fs::write(&path, [0xC9, 0xCD, 0xBB]).unwrap();

        let engine = Arc::new(Recording::default());
        let cache = ScriptCache::new(engine.clone(), &path);
        cache.get_or_compile().unwrap();

        assert_eq!(*engine.last_source.lock(), "╔═╗");
    }
}
