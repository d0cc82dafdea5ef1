//! Schema migrations over persisted records.
//!
//! Migrations never edit a data file in place. The pipeline replays the
//! current data log record by record, folds every unexecuted transform over
//! the decoded value, and appends the result to a freshly rotated target
//! file; the rotation sequence then points at the target. One history entry
//! per applied migration is appended to `<name>.migration.log`, and only
//! after the replay completed without error. A mid-run failure surfaces and
//! leaves the partially written target on disk for inspection, unadopted by
//! history.

use crate::codec::{Base64JsonCodec, Codec};
use crate::error::{Result, StoreError};
use crate::memtable::config::Migration;
use crate::memtable::rotation::FileRotationSequence;
use crate::memtable::{Record, RecordKind};
use crate::wal::MessageLog;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use tracing::{debug, info};

/// One applied migration, as persisted in the history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Name of the applied migration.
    #[serde(rename = "Name")]
    pub name: String,
    /// Version tag of the applied migration.
    #[serde(rename = "Version")]
    pub version: String,
    /// When the migration ran.
    #[serde(rename = "Executed")]
    pub executed: DateTime<Utc>,
    /// Data file the migration read from.
    #[serde(rename = "SourceFile")]
    pub source_file: String,
    /// Data file the migration wrote to.
    #[serde(rename = "TargetFile")]
    pub target_file: String,
}

/// Validates declared migrations against history and applies the rest.
pub(crate) struct MigrationManager<'a, K, M> {
    collection: &'a str,
    rotation: &'a FileRotationSequence,
    history: Vec<MigrationRecord>,
    history_log: MessageLog<MigrationRecord>,
    migrations: &'a [Migration<M>],
    _key: PhantomData<fn() -> K>,
}

impl<'a, K, M> MigrationManager<'a, K, M>
where
    K: Serialize + DeserializeOwned,
    M: Serialize + DeserializeOwned,
{
    /// Loads the migration history for `collection` from the rotation
    /// sequence's directory.
    pub fn new(
        collection: &'a str,
        rotation: &'a FileRotationSequence,
        migrations: &'a [Migration<M>],
    ) -> Result<Self> {
        let history_path = rotation
            .base_dir()
            .join(format!("{collection}.migration.log"));
        let mut history_log = MessageLog::open(history_path)?;
        let mut history = Vec::new();
        history_log.open_and_replay(|record| {
            history.push(record);
            Ok(())
        })?;

        Ok(Self {
            collection,
            rotation,
            history,
            history_log,
            migrations,
            _key: PhantomData,
        })
    }

    /// Compares the declared list against history and applies what is new.
    ///
    /// Every declared migration below the history length must match the
    /// recorded `(name, version)` at its position; a mismatch refuses to
    /// proceed without touching any file. Declarations beyond the history
    /// are applied in order through one source-to-target rewrite.
    pub fn migrate(&mut self) -> Result<()> {
        let mut pending = Vec::new();
        for (position, migration) in self.migrations.iter().enumerate() {
            match self.history.get(position) {
                Some(recorded)
                    if recorded.name != migration.name
                        || recorded.version != migration.version =>
                {
                    return Err(StoreError::MigrationOrder {
                        position,
                        declared_name: migration.name.clone(),
                        declared_version: migration.version.clone(),
                        recorded_name: recorded.name.clone(),
                        recorded_version: recorded.version.clone(),
                    });
                }
                Some(_) => {
                    debug!(
                        collection = self.collection,
                        name = %migration.name,
                        version = %migration.version,
                        "migration already executed"
                    );
                }
                None => {
                    debug!(
                        collection = self.collection,
                        name = %migration.name,
                        version = %migration.version,
                        "queueing migration for execution"
                    );
                    pending.push(migration);
                }
            }
        }

        if pending.is_empty() {
            return Ok(());
        }

        let source_path = self.rotation.current_filename();
        let target_path = self.rotation.next_filename();
        let executed = Utc::now();

        let mut source: MessageLog<Record<K>> = MessageLog::open(&source_path)?;
        let mut target: MessageLog<Record<K>> = MessageLog::open(&target_path)?;
        let value_codec: Base64JsonCodec<M> = Base64JsonCodec::new();

        source.open_and_replay(|mut record| {
            // Deletions carry no value; they pass through untouched.
            if record.kind == RecordKind::Write {
                let mut object = value_codec.decode(&record.value)?;
                for migration in &pending {
                    object = (migration.transform)(object)?;
                }
                record.value = value_codec.encode(&object)?;
            }
            target.append(&record)
        })?;

        target.close()?;
        source.close()?;

        for migration in &pending {
            info!(
                collection = self.collection,
                name = %migration.name,
                version = %migration.version,
                source = %source_path.display(),
                target = %target_path.display(),
                "migration applied"
            );
            let record = MigrationRecord {
                name: migration.name.clone(),
                version: migration.version.clone(),
                executed,
                source_file: source_path.display().to_string(),
                target_file: target_path.display().to_string(),
            };
            self.history_log.append(&record)?;
            self.history.push(record);
        }
        Ok(())
    }

    /// Flushes and closes the history log.
    pub fn close(self) -> Result<()> {
        self.history_log.close()
    }
}
