//! BLAKE3 file hasher with two fingerprint tiers.
//!
//! # Overview
//!
//! - **Partial** tier: hash of the first [`PARTIAL_BLOCK_SIZE`] bytes, plus the
//!   last [`PARTIAL_BLOCK_SIZE`] bytes for files above [`TAIL_THRESHOLD`], plus
//!   the file size. One short read (two for large files), and enough to tell
//!   most distinct files apart.
//! - **Full** tier: hash of the entire content, streamed in
//!   [`READ_BUFFER_SIZE`] chunks.
//!
//! A file that fits in one block is read completely during the partial pass,
//! so its partial result is already a full-tier fingerprint and is looked up
//! in the metadata cache like any other full-tier result. Zero-byte files all
//! share [`Fingerprint::empty`] and are never opened.
//!
//! Every open-and-read is counted, so callers (and tests) can verify that
//! files with a unique partial fingerprint never trigger a full read.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Serialize, Serializer};

use super::{FileDescriptor, HashError};
use crate::cache::MetadataCache;
use crate::cancel::CancellationToken;

/// A BLAKE3 digest.
pub type Hash = [u8; 32];

/// Bytes hashed from the head (and tail) of a file in the partial tier.
pub const PARTIAL_BLOCK_SIZE: usize = 4096;

/// Files larger than this also contribute their last block to the partial tier.
pub const TAIL_THRESHOLD: u64 = 16 * 1024;

/// Chunk size for streaming full-tier reads.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Which part of the content a fingerprint covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Head, optional tail and size only.
    Partial,
    /// Entire content.
    Full,
}

/// Content identity of a file.
///
/// The tier is part of equality: a partial fingerprint never equals a full one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint {
    pub tier: Tier,
    #[serde(serialize_with = "serialize_hash")]
    pub hash: Hash,
    pub size: u64,
}

impl Fingerprint {
    #[must_use]
    pub fn full(hash: Hash, size: u64) -> Self {
        Self {
            tier: Tier::Full,
            hash,
            size,
        }
    }

    /// The fingerprint shared by every zero-byte file.
    #[must_use]
    pub fn empty() -> Self {
        Self::full(*blake3::hash(&[]).as_bytes(), 0)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.tier == Tier::Full
    }

    #[must_use]
    pub fn hash_hex(&self) -> String {
        hash_to_hex(&self.hash)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("tier", &self.tier)
            .field("hash", &self.hash_hex())
            .field("size", &self.size)
            .finish()
    }
}

fn serialize_hash<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hash_to_hex(hash))
}

/// Lowercase hex rendering of a digest.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    blake3::Hash::from(*hash).to_hex().to_string()
}

/// A hashing result and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashOutcome {
    pub fingerprint: Fingerprint,
    /// `true` when served by the metadata cache without reading the file.
    pub cached: bool,
}

/// Snapshot of the hasher's read counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HashCounters {
    /// Files opened for a partial-tier read.
    pub partial_reads: u64,
    /// Files opened for a full-tier read.
    pub full_reads: u64,
    /// Total bytes read across both tiers.
    pub bytes_read: u64,
}

/// Streaming BLAKE3 hasher shared by all workers of a scan.
#[derive(Debug)]
pub struct Hasher {
    buffer_size: usize,
    cancel: Option<CancellationToken>,
    partial_reads: AtomicU64,
    full_reads: AtomicU64,
    bytes_read: AtomicU64,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer_size: READ_BUFFER_SIZE,
            cancel: None,
            partial_reads: AtomicU64::new(0),
            full_reads: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
        }
    }

    /// Abandon full-tier reads between chunks once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    #[must_use]
    pub fn counters(&self) -> HashCounters {
        HashCounters {
            partial_reads: self.partial_reads.load(Ordering::Relaxed),
            full_reads: self.full_reads.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Compute the partial-tier fingerprint.
    ///
    /// Returns a [`Tier::Full`] fingerprint when the read already covered the
    /// whole file.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or read.
    pub fn partial(&self, file: &FileDescriptor) -> Result<Fingerprint, HashError> {
        if file.size == 0 {
            return Ok(Fingerprint::empty());
        }

        let path = &file.path;
        let mut handle = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        self.partial_reads.fetch_add(1, Ordering::Relaxed);

        let mut hasher = blake3::Hasher::new();

        if file.size <= PARTIAL_BLOCK_SIZE as u64 {
            let mut content = Vec::with_capacity(PARTIAL_BLOCK_SIZE);
            (&mut handle)
                .take(file.size)
                .read_to_end(&mut content)
                .map_err(|e| HashError::from_io(path, e))?;
            self.bytes_read
                .fetch_add(content.len() as u64, Ordering::Relaxed);
            hasher.update(&content);
            return Ok(Fingerprint::full(*hasher.finalize().as_bytes(), file.size));
        }

        let mut block = [0u8; PARTIAL_BLOCK_SIZE];
        handle
            .read_exact(&mut block)
            .map_err(|e| HashError::from_io(path, e))?;
        hasher.update(&block);
        let mut read = PARTIAL_BLOCK_SIZE as u64;

        if file.size > TAIL_THRESHOLD {
            handle
                .seek(SeekFrom::End(-(PARTIAL_BLOCK_SIZE as i64)))
                .map_err(|e| HashError::from_io(path, e))?;
            handle
                .read_exact(&mut block)
                .map_err(|e| HashError::from_io(path, e))?;
            hasher.update(&block);
            read += PARTIAL_BLOCK_SIZE as u64;
        }

        // Size is mixed in so equal head/tail with different lengths differ.
        hasher.update(&file.size.to_le_bytes());
        self.bytes_read.fetch_add(read, Ordering::Relaxed);

        Ok(Fingerprint {
            tier: Tier::Partial,
            hash: *hasher.finalize().as_bytes(),
            size: file.size,
        })
    }

    /// Compute the full-tier fingerprint by streaming the whole file.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Interrupted`] when cancelled mid-read, or another
    /// [`HashError`] if the file cannot be opened or read.
    pub fn full(&self, file: &FileDescriptor) -> Result<Fingerprint, HashError> {
        if file.size == 0 {
            return Ok(Fingerprint::empty());
        }

        let path = &file.path;
        let mut handle = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        self.full_reads.fetch_add(1, Ordering::Relaxed);

        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.buffer_size];
        loop {
            if self.is_cancelled() {
                log::trace!("Full hash interrupted: {}", path.display());
                return Err(HashError::Interrupted(path.clone()));
            }
            let n = match handle.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            hasher.update(&buffer[..n]);
            self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        }

        Ok(Fingerprint::full(*hasher.finalize().as_bytes(), file.size))
    }

    /// Partial-tier fingerprint. Files small enough to be settled by this
    /// read are served from `cache` when size and mtime match.
    ///
    /// # Errors
    ///
    /// Same as [`partial`](Self::partial).
    pub fn partial_cached(
        &self,
        file: &FileDescriptor,
        cache: Option<&dyn MetadataCache>,
    ) -> Result<HashOutcome, HashError> {
        if file.size <= PARTIAL_BLOCK_SIZE as u64 {
            if let Some(fingerprint) = Self::lookup(file, cache) {
                return Ok(HashOutcome {
                    fingerprint,
                    cached: true,
                });
            }
        }

        self.partial(file).map(|fingerprint| HashOutcome {
            fingerprint,
            cached: false,
        })
    }

    /// Full-tier fingerprint, served from `cache` when size and mtime match.
    ///
    /// Lookup failures are treated as misses. Storing fresh results is left to
    /// the caller so the cache keeps a single writer.
    ///
    /// # Errors
    ///
    /// Same as [`full`](Self::full).
    pub fn full_cached(
        &self,
        file: &FileDescriptor,
        cache: Option<&dyn MetadataCache>,
    ) -> Result<HashOutcome, HashError> {
        if let Some(fingerprint) = Self::lookup(file, cache) {
            return Ok(HashOutcome {
                fingerprint,
                cached: true,
            });
        }

        self.full(file).map(|fingerprint| HashOutcome {
            fingerprint,
            cached: false,
        })
    }

    fn lookup(file: &FileDescriptor, cache: Option<&dyn MetadataCache>) -> Option<Fingerprint> {
        let cache = cache.filter(|_| file.size > 0)?;
        match cache.lookup(&file.path, file.size, file.modified) {
            Ok(Some(fingerprint)) => {
                log::trace!("Cache hit: {}", file.path.display());
                Some(fingerprint)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Cache lookup failed for {}: {}", file.path.display(), e);
                None
            }
        }
    }
}
