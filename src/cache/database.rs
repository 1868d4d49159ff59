//! SQLite-backed metadata cache.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::entry::{mtime_to_parts, parts_to_mtime};
use super::{CacheEntry, CacheError, CacheResult, MetadataCache};
use crate::scanner::{Fingerprint, Hash};

/// Bumped whenever the table layout or the fingerprint scheme changes.
const SCHEMA_VERSION: i64 = 2;

// `path` holds the raw OS bytes of the path, never a lossy string.
const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS file_hashes (
    path        BLOB PRIMARY KEY NOT NULL,
    size        INTEGER NOT NULL,
    mtime_secs  INTEGER NOT NULL,
    mtime_nanos INTEGER NOT NULL,
    hash        BLOB NOT NULL
);";

/// Persistent metadata cache using SQLite.
///
/// The connection sits behind a mutex so the cache can be shared with worker
/// threads for lookups.
pub struct HashCache {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for HashCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashCache").field("path", &self.path).finish()
    }
}

impl HashCache {
    /// Open or create the cache database at `path`, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Corrupt`] when the file is not a readable SQLite
    /// database, [`CacheError::Io`] when the directory cannot be created, and
    /// [`CacheError::Database`] for any other SQLite failure.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        let cache = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        cache
            .configure_pragmas()
            .and_then(|()| cache.migrate_schema())
            .map_err(|e| classify_open_error(path, e))?;

        log::debug!("Opened hash cache at {}", path.display());
        Ok(cache)
    }

    /// Cache that lives only as long as this value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if SQLite cannot allocate the database.
    pub fn open_in_memory() -> CacheResult<Self> {
        let cache = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        cache.migrate_schema()?;
        Ok(cache)
    }

    /// Database path, `None` for in-memory caches.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Delete the database file and its WAL side files. Missing files are fine.
    pub fn remove_files(path: &Path) {
        let mut candidates = vec![path.to_path_buf()];
        for suffix in ["-wal", "-shm"] {
            let mut name = path.as_os_str().to_owned();
            name.push(suffix);
            candidates.push(PathBuf::from(name));
        }
        for candidate in candidates {
            if let Err(e) = fs::remove_file(&candidate) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to remove {}: {}", candidate.display(), e);
                }
            }
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn configure_pragmas(&self) -> rusqlite::Result<()> {
        self.conn().execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        log::trace!("SQLite pragmas configured (WAL mode)");
        Ok(())
    }

    /// Check the schema version and rebuild if it differs.
    /// Cached data is derived and can always be recomputed.
    fn migrate_schema(&self) -> rusqlite::Result<()> {
        let conn = self.conn();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version != SCHEMA_VERSION {
            if version != 0 {
                log::debug!(
                    "Cache schema version {} != {}, rebuilding",
                    version,
                    SCHEMA_VERSION
                );
            }
            conn.execute_batch("DROP TABLE IF EXISTS file_hashes;")?;
        }
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// Number of cached entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] on query failure.
    pub fn len(&self) -> CacheResult<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM file_hashes", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// # Errors
    ///
    /// Returns [`CacheError::Database`] on query failure.
    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] on failure.
    pub fn clear(&self) -> CacheResult<()> {
        self.conn().execute("DELETE FROM file_hashes", [])?;
        Ok(())
    }

    /// Drop entries whose path no longer exists. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] on failure.
    pub fn prune_missing(&self) -> CacheResult<usize> {
        let conn = self.conn();
        let keys: Vec<Vec<u8>> = {
            let mut stmt = conn.prepare("SELECT path FROM file_hashes")?;
            let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
            rows.collect::<Result<_, _>>()?
        };

        let mut removed = 0;
        for key in keys {
            let exists = key_to_path(&key).is_some_and(|path| path.exists());
            if !exists {
                removed += conn.execute("DELETE FROM file_hashes WHERE path = ?1", params![key])?;
            }
        }
        if removed > 0 {
            log::debug!("Pruned {} stale cache entries", removed);
        }
        Ok(removed)
    }
}

impl MetadataCache for HashCache {
    fn lookup(
        &self,
        path: &Path,
        size: u64,
        modified: SystemTime,
    ) -> CacheResult<Option<Fingerprint>> {
        let key = path_key(path);
        let row: Option<(i64, i64, i64, Vec<u8>)> = self
            .conn()
            .query_row(
                "SELECT size, mtime_secs, mtime_nanos, hash FROM file_hashes WHERE path = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((stored_size, secs, nanos, blob)) = row else {
            return Ok(None);
        };

        let stored_mtime = u32::try_from(nanos).ok().map(|n| parts_to_mtime(secs, n));
        if u64::try_from(stored_size).ok() != Some(size) || stored_mtime != Some(modified) {
            log::trace!("Stale cache entry: {}", path.display());
            return Ok(None);
        }

        let Ok(hash) = Hash::try_from(blob.as_slice()) else {
            log::debug!("Malformed cache entry for {}, ignoring", path.display());
            return Ok(None);
        };
        Ok(Some(Fingerprint::full(hash, size)))
    }

    fn store(&self, entry: &CacheEntry) -> CacheResult<()> {
        if !entry.fingerprint.is_full() {
            log::debug!(
                "Refusing to cache partial fingerprint for {}",
                entry.path.display()
            );
            return Ok(());
        }

        let (secs, nanos) = entry.mtime_parts();
        self.conn().execute(
            "INSERT OR REPLACE INTO file_hashes (path, size, mtime_secs, mtime_nanos, hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                path_key(&entry.path),
                i64::try_from(entry.size).unwrap_or(i64::MAX),
                secs,
                i64::from(nanos),
                &entry.fingerprint.hash[..],
            ],
        )?;
        Ok(())
    }
}

/// Lossless byte encoding of a path, used as the primary key.
#[cfg(unix)]
fn path_key(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(unix)]
fn key_to_path(key: &[u8]) -> Option<PathBuf> {
    use std::os::unix::ffi::OsStrExt;
    Some(PathBuf::from(std::ffi::OsStr::from_bytes(key)))
}

/// UTF-16 code units, little endian. Unpaired surrogates survive.
#[cfg(windows)]
fn path_key(path: &Path) -> Vec<u8> {
    use std::os::windows::ffi::OsStrExt;
    path.as_os_str()
        .encode_wide()
        .flat_map(u16::to_le_bytes)
        .collect()
}

#[cfg(windows)]
fn key_to_path(key: &[u8]) -> Option<PathBuf> {
    use std::os::windows::ffi::OsStringExt;
    if key.len() % 2 != 0 {
        return None;
    }
    let wide: Vec<u16> = key
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Some(PathBuf::from(std::ffi::OsString::from_wide(&wide)))
}

// Other targets only have UTF-8 paths.
#[cfg(not(any(unix, windows)))]
fn path_key(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(not(any(unix, windows)))]
fn key_to_path(key: &[u8]) -> Option<PathBuf> {
    std::str::from_utf8(key).ok().map(PathBuf::from)
}

fn classify_open_error(path: &Path, error: rusqlite::Error) -> CacheError {
    match error.sqlite_error_code() {
        Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) => CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: error.to_string(),
        },
        _ => CacheError::Database(error),
    }
}
