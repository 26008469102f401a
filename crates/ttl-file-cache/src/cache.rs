//! Disk-backed cache with an in-memory expiration index

use crate::cleaner::Cleaner;
use crate::error::{FileCacheError, Result};
use crate::options::CacheOptions;
use crate::types::CacheStats;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tempfile::{TempDir, TempPath};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const WORKDIR_PREFIX: &str = "filecache-";
const FILE_PREFIX: &str = "cache-";

/// Deadline used when `now + ttl` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

type Entries = HashMap<String, Entry>;

/// A cached value: its deadline and the file holding its bytes
///
/// The file is removed when the entry is dropped, so an entry's file never
/// outlives it.
struct Entry {
    expires_at: Instant,
    size: u64,
    file: TempPath,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn path(&self) -> &Path {
        &self.file
    }

    /// Remove the backing file, logging instead of failing
    fn release(self, key: &str) {
        if let Err(e) = self.file.close() {
            warn!(key = %key, error = %e, "Failed to remove cache file");
        }
    }
}

/// Lock-guarded key index shared between the cache handle and its cleaner
pub(crate) struct Index {
    entries: RwLock<Entries>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Index {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn deadline(&self, now: Instant) -> Instant {
        now.checked_add(self.ttl).unwrap_or(now + FAR_FUTURE)
    }

    fn miss(&self, key: &str) -> FileCacheError {
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Cache miss");
        FileCacheError::NotFound
    }

    /// Remove every entry whose deadline has passed
    ///
    /// Candidates are collected under the shared lock and re-checked under the
    /// exclusive lock, since a `get` may have extended a deadline or a `put`
    /// may have replaced the entry in between.
    pub(crate) async fn sweep_expired(&self) -> usize {
        let now = Instant::now();

        let candidates: Vec<String> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect()
        };

        if candidates.is_empty() {
            return 0;
        }

        let evicted: Vec<(String, Entry)> = {
            let mut entries = self.entries.write().await;
            candidates
                .into_iter()
                .filter_map(|key| {
                    let expired = entries.get(&key).is_some_and(|e| e.is_expired(now));
                    if expired {
                        entries.remove_entry(&key)
                    } else {
                        None
                    }
                })
                .collect()
        };

        let count = evicted.len();
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        for (key, entry) in evicted {
            entry.release(&key);
        }

        count
    }
}

/// A key/value cache that keeps each value in its own file
///
/// Values live in a private working directory that is removed on
/// [`stop`](FileCache::stop) (or when the handle is dropped). Every
/// successful read pushes the entry's deadline forward by the configured
/// time-to-live.
pub struct FileCache {
    index: Arc<Index>,
    workdir: TempDir,
    sweep_interval: Duration,
    cleaner: Mutex<Option<Cleaner>>,
}

impl FileCache {
    /// Create a cache with a fresh working directory
    ///
    /// No background work starts until [`start`](FileCache::start) is called.
    pub fn new(options: CacheOptions) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKDIR_PREFIX);
        let workdir = match &options.base_dir {
            Some(dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };

        info!(
            workdir = ?workdir.path(),
            ttl_secs = options.time_to_live.as_secs(),
            sweep_interval_secs = options.sweep_interval.as_secs(),
            "File cache created"
        );

        Ok(Self {
            index: Arc::new(Index::new(options.time_to_live)),
            workdir,
            sweep_interval: options.sweep_interval,
            cleaner: Mutex::new(None),
        })
    }

    /// Launch the background cleaner. Must be called within a tokio runtime.
    ///
    /// Calling it again on a started cache does nothing.
    pub fn start(&self) {
        let mut cleaner = self.cleaner.lock().unwrap_or_else(PoisonError::into_inner);
        if cleaner.is_some() {
            debug!("File cache already started");
            return;
        }
        *cleaner = Some(Cleaner::spawn(Arc::clone(&self.index), self.sweep_interval));
    }

    /// Stop the cleaner, release every entry and delete the working directory
    pub async fn stop(self) {
        let cleaner = self
            .cleaner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(cleaner) = cleaner {
            cleaner.shutdown().await;
        }

        let drained: Vec<(String, Entry)> = self.index.entries.write().await.drain().collect();
        let released = drained.len();
        for (key, entry) in drained {
            entry.release(&key);
        }

        let workdir = self.workdir.path().to_path_buf();
        if let Err(e) = self.workdir.close() {
            warn!(workdir = ?workdir, error = %e, "Failed to remove cache working directory");
        }

        info!(workdir = ?workdir, released, "File cache stopped");
    }

    /// Path of the private working directory
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Get the value for `key`, refreshing its deadline
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let entries = self.checkout(key).await?;
        let entry = entries.get(key).ok_or(FileCacheError::NotFound)?;

        let data = fs::read(entry.path()).await?;
        debug!(key = %key, size = data.len(), "Cache hit");
        Ok(data)
    }

    /// Copy the value for `key` into `writer`, refreshing its deadline
    ///
    /// Writers are blocked from the index until the copy finishes, so slow
    /// sinks should be buffered by the caller.
    pub async fn get_to_writer<W>(&self, key: &str, mut writer: W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let entries = self.checkout(key).await?;
        let entry = entries.get(key).ok_or(FileCacheError::NotFound)?;

        let mut file = File::open(entry.path()).await?;
        let copied = tokio::io::copy(&mut file, &mut writer).await?;
        writer.flush().await?;

        debug!(key = %key, size = copied, "Cache hit");
        Ok(copied)
    }

    /// Store `value` under `key`, replacing any previous value
    pub async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let (mut file, path) = self.create_file()?;
        file.write_all(value).await?;
        file.flush().await?;
        drop(file);

        self.install(key, path, value.len() as u64).await;
        Ok(())
    }

    /// Store everything read from `reader` under `key`, returning the byte count
    pub async fn put_reader<R>(&self, key: &str, mut reader: R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let (mut file, path) = self.create_file()?;
        let size = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        drop(file);

        self.install(key, path, size).await;
        Ok(size)
    }

    /// Run one expiration sweep now, returning the number of evicted entries
    pub async fn sweep_expired(&self) -> usize {
        self.index.sweep_expired().await
    }

    pub async fn len(&self) -> usize {
        self.index.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.entries.read().await.is_empty()
    }

    /// Get current cache statistics
    pub async fn stats(&self) -> CacheStats {
        let entries = self.index.entries.read().await;
        CacheStats {
            entries: entries.len(),
            total_size: entries.values().map(|e| e.size).sum(),
            hits: self.index.hits.load(Ordering::Relaxed),
            misses: self.index.misses.load(Ordering::Relaxed),
            evictions: self.index.evictions.load(Ordering::Relaxed),
        }
    }

    fn create_file(&self) -> Result<(File, TempPath)> {
        let (file, path) = tempfile::Builder::new()
            .prefix(FILE_PREFIX)
            .tempfile_in(self.workdir.path())?
            .into_parts();
        Ok((File::from_std(file), path))
    }

    async fn install(&self, key: &str, file: TempPath, size: u64) {
        let entry = Entry {
            expires_at: self.index.deadline(Instant::now()),
            size,
            file,
        };

        let replaced = self
            .index
            .entries
            .write()
            .await
            .insert(key.to_string(), entry);

        if let Some(old) = replaced {
            debug!(key = %key, "Replacing cache entry");
            old.release(key);
        }
        debug!(key = %key, size, "Cached value");
    }

    /// Look up a live entry, extend its deadline and return a shared guard
    /// under which its file can be read
    ///
    /// Expired entries are removed here. The shared lookup only filters out
    /// misses cheaply; the entry is looked up again under the exclusive lock
    /// because it may have been evicted or replaced in between.
    async fn checkout(&self, key: &str) -> Result<RwLockReadGuard<'_, Entries>> {
        let present = self.index.entries.read().await.contains_key(key);
        if !present {
            return Err(self.index.miss(key));
        }

        let mut entries = self.index.entries.write().await;
        let now = Instant::now();

        let expired = match entries.get_mut(key) {
            None => return Err(self.index.miss(key)),
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                entry.expires_at = self.index.deadline(now);
                false
            }
        };

        if expired {
            let removed = entries.remove(key);
            drop(entries);
            if let Some(entry) = removed {
                self.index.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache entry expired");
                entry.release(key);
            }
            return Err(self.index.miss(key));
        }

        self.index.hits.fetch_add(1, Ordering::Relaxed);
        Ok(entries.downgrade())
    }
}
