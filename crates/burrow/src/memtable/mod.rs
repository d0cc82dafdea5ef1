//! Durable ordered key-value store: skip-list index plus write-ahead log.
//!
//! A [`Memtable`] owns an in-memory [`SkipList`] and an append-only
//! [`MessageLog`]. Every mutation appends one record to the log before the
//! index changes, so replaying the current log from the start reproduces the
//! index exactly; on open the memtable does precisely that. A rotation
//! sequence names the data files `<name>.<n>.<suffix>` and the compactor
//! periodically rewrites live state into the next file so the log stays
//! bounded. Declared schema migrations run over the same rewrite path before
//! the log is replayed.
//!
//! The data directory is single-writer: two memtables opened on the same
//! `(directory, name)` pair are undefined.

mod config;
mod migration;
mod rotation;

pub use config::{MemtableConfig, Migration, MigrationObject};
pub use migration::MigrationRecord;

use crate::codec::{Base64JsonCodec, Codec};
use crate::error::{Result, StoreError};
use crate::skiplist::SkipList;
use crate::wal::{self, MessageLog};
use migration::MigrationManager;
use parking_lot::{Mutex, MutexGuard, RwLock};
use rotation::FileRotationSequence;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Suffix of the rotating data files.
const LOG_SUFFIX: &str = "mtlog";

/// Tag distinguishing writes from deletions within a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub(crate) enum RecordKind {
    /// The key was removed; the value payload is empty.
    Delete = 0,
    /// The key was written with the value payload.
    Write = 1,
}

impl From<RecordKind> for i8 {
    fn from(kind: RecordKind) -> i8 {
        kind as i8
    }
}

impl TryFrom<i8> for RecordKind {
    type Error = String;

    fn try_from(raw: i8) -> std::result::Result<Self, Self::Error> {
        match raw {
            0 => Ok(RecordKind::Delete),
            1 => Ok(RecordKind::Write),
            other => Err(format!("unknown record type {other}")),
        }
    }
}

/// One WAL record: operation tag, key, and the codec-encoded value bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Record<K> {
    #[serde(rename = "Type")]
    pub(crate) kind: RecordKind,
    #[serde(rename = "Key")]
    pub(crate) key: K,
    #[serde(rename = "Value")]
    pub(crate) value: Vec<u8>,
}

struct Inner<K, V> {
    name: String,
    index: RwLock<SkipList<K, V>>,
    /// The single critical section: guards the active log handle, every
    /// append, and the compaction swap. `None` after close.
    log: Mutex<Option<MessageLog<Record<K>>>>,
    rotation: FileRotationSequence,
    codec: Box<dyn Codec<V> + Send + Sync>,
    compact_threshold: usize,
    auto_compact: bool,
    compaction_scheduled: AtomicBool,
}

/// Embeddable single-writer ordered key-value store.
///
/// Reads are served from the index alone and never touch the disk. Writes
/// append to the log first and mutate the index second, under one mutex, so
/// the record order in the log matches the mutation order the index
/// observed. On success a write schedules an asynchronous compaction check;
/// concurrent writes coalesce into at most one scheduled pass.
pub struct Memtable<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Memtable<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Opens the store `name` with the canonical value codec.
    ///
    /// Resolves the current data file, runs declared migrations (which may
    /// rotate it), and replays the log into a fresh index.
    pub fn open(name: &str, config: MemtableConfig) -> Result<Self>
    where
        V: Serialize + DeserializeOwned,
    {
        Self::open_with_codec(name, config, Base64JsonCodec::new())
    }

    /// Opens the store `name` with a caller-supplied value codec.
    ///
    /// The codec must be the one every record in the data file was written
    /// with, and the one the migration pipeline assumes.
    pub fn open_with_codec(
        name: &str,
        config: MemtableConfig,
        codec: impl Codec<V> + Send + Sync + 'static,
    ) -> Result<Self> {
        let rotation = FileRotationSequence::init(&config.data_dir, name, LOG_SUFFIX)?;

        if !config.migrations.is_empty() {
            let mut manager =
                MigrationManager::<K, MigrationObject>::new(name, &rotation, &config.migrations)?;
            manager.migrate()?;
            manager.close()?;
        }

        let mut log = MessageLog::open(rotation.current_filename())?;
        let mut index = SkipList::new();
        let replayed = log.open_and_replay(|record: Record<K>| match record.kind {
            RecordKind::Write => {
                let value = codec.decode(&record.value)?;
                index.set(record.key, value);
                Ok(())
            }
            RecordKind::Delete => {
                index.delete(&record.key);
                Ok(())
            }
        })?;
        info!(
            name,
            file = %log.path().display(),
            records = replayed,
            "memtable loaded"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                index: RwLock::new(index),
                log: Mutex::new(Some(log)),
                rotation,
                codec: Box::new(codec),
                compact_threshold: config.compact_threshold,
                auto_compact: config.auto_compact,
                compaction_scheduled: AtomicBool::new(false),
            }),
        })
    }

    /// Stores `value` under `key`, replacing any existing entry.
    ///
    /// The record is appended to the log before the index changes; if the
    /// append fails the index is untouched and the error surfaces.
    pub fn set(&self, key: K, value: V) -> Result<()> {
        let encoded = self.inner.codec.encode(&value)?;
        let record = Record {
            kind: RecordKind::Write,
            key,
            value: encoded,
        };

        let excess = {
            let mut guard = self.inner.log.lock();
            let log = match guard.as_mut() {
                Some(log) => log,
                None => return Err(StoreError::Closed),
            };
            log.append(&record)?;
            let Record { key, .. } = record;
            let mut index = self.inner.index.write();
            index.set(key, value);
            log.message_count() >= index.len() + self.inner.compact_threshold
        };

        if excess {
            self.schedule_compaction();
        }
        Ok(())
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.index.read().get(key).cloned()
    }

    /// Removes `key`. Returns whether an entry was removed.
    ///
    /// The deletion record is appended even when the key is absent; replay
    /// handles that the same way the live index did.
    pub fn delete(&self, key: K) -> Result<bool> {
        let record = Record {
            kind: RecordKind::Delete,
            key,
            value: Vec::new(),
        };

        let (changed, excess) = {
            let mut guard = self.inner.log.lock();
            let log = match guard.as_mut() {
                Some(log) => log,
                None => return Err(StoreError::Closed),
            };
            log.append(&record)?;
            let mut index = self.inner.index.write();
            let changed = index.delete(&record.key);
            (
                changed,
                log.message_count() >= index.len() + self.inner.compact_threshold,
            )
        };

        if excess {
            self.schedule_compaction();
        }
        Ok(changed)
    }

    /// Ordered snapshot of all entries.
    pub fn entries(&self) -> Vec<(K, V)> {
        let index = self.inner.index.read();
        index
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Ordered snapshot of all keys.
    pub fn keys(&self) -> Vec<K> {
        self.inner.index.read().keys().cloned().collect()
    }

    /// Ordered snapshot of all values.
    pub fn values(&self) -> Vec<V> {
        self.inner.index.read().values().cloned().collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.index.read().len()
    }

    /// Returns `true` when the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.index.read().is_empty()
    }

    /// The store's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of records in the active log, including replayed ones.
    ///
    /// The difference to [`len`](Self::len) counts superseded records since
    /// the last compaction.
    pub fn message_count(&self) -> usize {
        self.inner
            .log
            .lock()
            .as_ref()
            .map_or(0, MessageLog::message_count)
    }

    /// Rewrites the active log so it contains exactly the live state.
    ///
    /// Afterwards `message_count() == len()`. The old file is deleted once
    /// its replacement is fully written and adopted.
    pub fn compact(&self) -> Result<()> {
        let mut guard = self.inner.log.lock();
        if guard.is_none() {
            return Err(StoreError::Closed);
        }
        self.inner.compact_locked(&mut guard)
    }

    /// Fsyncs the active log.
    pub fn sync(&self) -> Result<()> {
        match self.inner.log.lock().as_mut() {
            Some(log) => log.sync(),
            None => Err(StoreError::Closed),
        }
    }

    /// Flushes and closes the active log, consuming the store.
    ///
    /// A compaction check still in flight observes the closed state and
    /// becomes a no-op.
    pub fn close(self) -> Result<()> {
        let log = self.inner.log.lock().take();
        match log {
            Some(log) => log.close(),
            None => Ok(()),
        }
    }

    /// Schedules the asynchronous compaction check, coalescing with any
    /// pass already scheduled.
    fn schedule_compaction(&self) {
        if !self.inner.auto_compact {
            return;
        }
        if self
            .inner
            .compaction_scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let inner = Arc::clone(&self.inner);
        thread::spawn(move || {
            let result = inner.auto_compaction();
            inner.compaction_scheduled.store(false, Ordering::SeqCst);
            if let Err(error) = result {
                warn!(name = %inner.name, %error, "auto-compaction failed");
            }
        });
    }
}

impl<K, V> Inner<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Clone,
{
    /// Re-checks the trigger under the lock and compacts when the dead-record
    /// excess still exceeds the threshold.
    fn auto_compaction(&self) -> Result<()> {
        let mut guard = self.log.lock();
        let (records, live) = match guard.as_ref() {
            Some(log) => (log.message_count(), self.index.read().len()),
            None => return Ok(()),
        };
        if records >= live + self.compact_threshold {
            debug!(name = %self.name, records, live, "auto-compaction triggered");
            self.compact_locked(&mut guard)?;
        }
        Ok(())
    }

    /// Rewrites live state into the next rotated file and swaps the handle.
    ///
    /// Runs with the log mutex held, so appends are blocked for the duration
    /// of the rewrite.
    fn compact_locked(&self, guard: &mut MutexGuard<'_, Option<MessageLog<Record<K>>>>) -> Result<()> {
        let mut next = MessageLog::open(self.rotation.next_filename())?;
        next.open_and_replay(wal::noop)?;

        {
            let index = self.index.read();
            for (key, value) in index.iter() {
                let record = Record {
                    kind: RecordKind::Write,
                    key: key.clone(),
                    value: self.codec.encode(value)?,
                };
                next.append(&record)?;
            }
        }

        let old = match guard.replace(next) {
            Some(old) => old,
            None => return Err(StoreError::Closed),
        };
        info!(
            name = %self.name,
            old_file = %old.path().display(),
            old_records = old.message_count(),
            live = guard.as_ref().map_or(0, MessageLog::message_count),
            "compaction completed"
        );
        old.delete()?;
        Ok(())
    }
}
