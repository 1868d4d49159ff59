//! In-process metadata cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use super::{CacheEntry, CacheResult, MetadataCache};
use crate::scanner::Fingerprint;

/// Metadata cache held in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetadataCache for MemoryCache {
    fn lookup(
        &self,
        path: &Path,
        size: u64,
        modified: SystemTime,
    ) -> CacheResult<Option<Fingerprint>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .get(path)
            .filter(|entry| entry.matches(size, modified))
            .map(|entry| entry.fingerprint))
    }

    fn store(&self, entry: &CacheEntry) -> CacheResult<()> {
        if entry.fingerprint.is_full() {
            self.entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(entry.path.clone(), entry.clone());
        }
        Ok(())
    }
}
