//! Shared executors keyed by batch identity.
//!
//! Builders that run one tool invocation over many target groups register a
//! single executor under a batch key and append further groups to it with
//! [`super::Executor::add_batch`]. The registry is an explicit value owned by
//! the caller; access to each executor is serialised through its mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ExecutorSlot, RegistryError};

/// Executor shared between every node of one batch.
pub type SharedExecutor = Arc<Mutex<ExecutorSlot>>;

/// Lock a shared executor, recovering from poisoning.
pub fn lock_slot(shared: &SharedExecutor) -> MutexGuard<'_, ExecutorSlot> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Map from batch key to the executor serving that batch.
#[derive(Debug, Default)]
pub struct BatchExecutorRegistry {
    executors: HashMap<String, SharedExecutor>,
}

impl BatchExecutorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `slot` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateKey`] when `key` is already taken.
    pub fn add(
        &mut self,
        key: impl Into<String>,
        slot: impl Into<ExecutorSlot>,
    ) -> Result<SharedExecutor, RegistryError> {
        let key = key.into();
        if self.executors.contains_key(&key) {
            return Err(RegistryError::DuplicateKey { key });
        }
        let shared = Arc::new(Mutex::new(slot.into()));
        self.executors.insert(key, Arc::clone(&shared));
        Ok(shared)
    }

    /// Executor registered under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<SharedExecutor> {
        self.executors.get(key).map(Arc::clone)
    }

    /// Number of registered executors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Forget every executor.
    pub fn clear(&mut self) {
        self.executors.clear();
    }
}
