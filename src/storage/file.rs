// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! File-backed config storage.
//!
//! Persists the widget config as a single JSON document, the embedded
//! analog of browser local storage. Writes go to a sibling temp file first
//! and are renamed into place so a crash mid-write never leaves a
//! half-written snapshot behind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ConfigStorage, StorageError};
use crate::config::WidgetConfig;

pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStorage for FileStorage {
    fn load(&self) -> Result<Option<WidgetConfig>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let config = serde_json::from_slice(&bytes)?;
        debug!(path = %self.path.display(), "loaded persisted widget config");
        Ok(Some(config))
    }

    fn save(&self, config: &WidgetConfig) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(config)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
