//! Memtable configuration.

use crate::error::Result;
use std::fmt;
use std::path::PathBuf;

/// Intermediate representation migrations transform: a dynamic keyed map of
/// field names to JSON values, matching the canonical textual codec.
pub type MigrationObject = serde_json::Map<String, serde_json::Value>;

/// A declared schema migration over the intermediate representation `M`.
///
/// Declarations are ordered; the memtable validates them against the
/// persisted migration history on open and applies the unexecuted suffix.
pub struct Migration<M = MigrationObject> {
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) transform: Box<dyn Fn(M) -> Result<M> + Send + Sync>,
}

impl<M> Migration<M> {
    /// Declares a migration with a name, a version and a value transform.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        transform: impl Fn(M) -> Result<M> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            transform: Box::new(transform),
        }
    }

    /// The migration's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The migration's version tag.
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl<M> fmt::Debug for Migration<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Configuration for [`Memtable::open`](crate::memtable::Memtable::open).
#[derive(Debug)]
pub struct MemtableConfig {
    /// Directory holding the data and migration-history files.
    pub(crate) data_dir: PathBuf,
    /// Dead-record budget before auto-compaction rewrites the log.
    pub(crate) compact_threshold: usize,
    /// Whether writes schedule the asynchronous compaction check.
    pub(crate) auto_compact: bool,
    /// Ordered migration declarations, validated and applied on open.
    pub(crate) migrations: Vec<Migration>,
}

impl Default for MemtableConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 100,
            auto_compact: true,
            migrations: Vec::new(),
        }
    }
}

impl MemtableConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the data directory (default `./data`).
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Sets the dead-record budget that triggers auto-compaction
    /// (default 100).
    pub fn with_compact_threshold(mut self, threshold: usize) -> Self {
        self.compact_threshold = threshold;
        self
    }

    /// Disables the asynchronous compaction check after writes.
    pub fn without_auto_compaction(mut self) -> Self {
        self.auto_compact = false;
        self
    }

    /// Appends a migration declaration.
    pub fn with_migration(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        transform: impl Fn(MigrationObject) -> Result<MigrationObject> + Send + Sync + 'static,
    ) -> Self {
        self.migrations.push(Migration::new(name, version, transform));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MemtableConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.compact_threshold, 100);
        assert!(config.auto_compact);
        assert!(config.migrations.is_empty());
    }

    #[test]
    fn test_builder_options() {
        let config = MemtableConfig::new()
            .with_data_dir("/tmp/elsewhere")
            .with_compact_threshold(7)
            .without_auto_compaction()
            .with_migration("demo", "V__1", Ok);

        assert_eq!(config.data_dir, PathBuf::from("/tmp/elsewhere"));
        assert_eq!(config.compact_threshold, 7);
        assert!(!config.auto_compact);
        assert_eq!(config.migrations.len(), 1);
        assert_eq!(config.migrations[0].name(), "demo");
        assert_eq!(config.migrations[0].version(), "V__1");
    }
}
