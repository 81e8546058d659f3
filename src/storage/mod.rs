//! Persisted client-side state.
//!
//! The widget keeps exactly one serialized [`WidgetConfig`](crate::config::WidgetConfig)
//! across page loads / process restarts. The seam is the [`ConfigStorage`]
//! trait; [`FileStorage`] is the production implementation and
//! [`InMemoryStorage`] backs tests and ephemeral sessions.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::InMemoryStorage;

use thiserror::Error;

use crate::config::WidgetConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt persisted config: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Storage for the single serialized widget config.
///
/// Reads happen once on boot; writes happen on every successful config
/// update. Operations are synchronous local I/O, never network calls.
pub trait ConfigStorage: Send + Sync {
    /// Load the persisted config, `None` when nothing was saved yet.
    fn load(&self) -> Result<Option<WidgetConfig>, StorageError>;

    /// Persist the config, replacing any previous snapshot.
    fn save(&self, config: &WidgetConfig) -> Result<(), StorageError>;

    /// Drop the persisted snapshot (logout/reset).
    fn clear(&self) -> Result<(), StorageError>;
}
