//! Named callbacks fired by exact input matches and by timers

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use atomic_utils::Result;

/// A script callback. It receives the name it was registered under.
pub trait Callback: Send + Sync {
    fn invoke(&self, name: &str) -> Result<()>;
}

impl<F> Callback for F
where
    F: Fn(&str) -> Result<()> + Send + Sync,
{
    fn invoke(&self, name: &str) -> Result<()> {
        self(name)
    }
}

/// Trigger name to callback. Callbacks are cloned out and invoked without
/// the lock held, so a callback may change the registry.
#[derive(Default)]
pub struct TriggerRegistry {
    triggers: Mutex<HashMap<String, Arc<dyn Callback>>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace
    pub fn register(&self, name: impl Into<String>, callback: Arc<dyn Callback>) {
        self.triggers.lock().insert(name.into(), callback);
    }

    /// Remove, returning whether the trigger existed
    pub fn remove(&self, name: &str) -> bool {
        self.triggers.lock().remove(name).is_some()
    }

    pub fn clear(&self) {
        self.triggers.lock().clear();
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Callback>> {
        self.triggers.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.triggers.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.triggers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.lock().is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.triggers.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for TriggerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerRegistry")
            .field("names", &self.names())
            .finish()
    }
}
