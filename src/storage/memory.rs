use parking_lot::Mutex;

use super::{ConfigStorage, StorageError};
use crate::config::WidgetConfig;

/// Non-persistent storage for tests and ephemeral sessions.
pub struct InMemoryStorage {
    inner: Mutex<Option<WidgetConfig>>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStorage for InMemoryStorage {
    fn load(&self) -> Result<Option<WidgetConfig>, StorageError> {
        Ok(self.inner.lock().clone())
    }

    fn save(&self, config: &WidgetConfig) -> Result<(), StorageError> {
        *self.inner.lock() = Some(config.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.inner.lock() = None;
        Ok(())
    }
}
