//! Write-ahead message log.
//!
//! An append-only file of length-framed records. Each frame is a 4-byte
//! little-endian length followed by exactly that many codec-encoded bytes;
//! there is no checksum and no delimiter. The log is read exactly once, when
//! it is opened, by replaying every frame into a consumer. The memtable uses
//! one instance as its WAL and the migration manager uses another for the
//! migration history.
//!
//! Appends are unbuffered, so a record handed to the OS survives a process
//! crash; [`MessageLog::sync`] and [`MessageLog::close`] additionally fsync
//! for durability across power loss. Torn tails are not repaired: a frame
//! whose payload ends early aborts the replay and the file is left untouched
//! for inspection.

use crate::codec::{Base64JsonCodec, Codec};
use crate::error::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A consumer that discards every replayed record.
///
/// Useful when a log is opened only to be appended to, such as a freshly
/// rotated compaction target.
pub fn noop<M>(_message: M) -> Result<()> {
    Ok(())
}

/// Append-only log of codec-encoded records.
///
/// Records are encoded with the canonical [`Base64JsonCodec`]. `append` takes
/// `&mut self`, so concurrent appends are serialized by construction; the
/// memtable keeps its log behind a mutex for exactly that reason.
pub struct MessageLog<M> {
    file: File,
    path: PathBuf,
    message_count: usize,
    codec: Base64JsonCodec<M>,
}

impl<M> MessageLog<M>
where
    M: Serialize + DeserializeOwned,
{
    /// Opens or creates the log file for reading and appending.
    ///
    /// Reads start at offset 0; appends always go to the end of the file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            file,
            path,
            message_count: 0,
            codec: Base64JsonCodec::new(),
        })
    }

    /// Replays every record from offset 0 to EOF into `consumer`.
    ///
    /// Returns the number of records consumed and sets the live message count
    /// to it. A consumer or decode error aborts the replay and surfaces.
    pub fn open_and_replay<F>(&mut self, mut consumer: F) -> Result<usize>
    where
        F: FnMut(M) -> Result<()>,
    {
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&self.file);
        let mut count = 0;
        while let Some(payload) = read_frame(&mut reader)? {
            let message = self.codec.decode(&payload)?;
            consumer(message)?;
            count += 1;
        }
        self.message_count = count;
        debug!(file = %self.path.display(), records = count, "message log replayed");
        Ok(count)
    }

    /// Appends one record: length prefix, then the encoded payload.
    pub fn append(&mut self, message: &M) -> Result<()> {
        let encoded = self.codec.encode(message)?;
        let len = u32::try_from(encoded.len()).map_err(|_| {
            StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "record exceeds frame capacity",
            ))
        })?;
        self.file.write_all(&len.to_le_bytes())?;
        self.file.write_all(&encoded)?;
        self.message_count += 1;
        Ok(())
    }

    /// Fsyncs the file so all appended records are durable.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Flushes and closes the log, consuming it.
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Closes the log and removes its backing file, consuming it.
    pub fn delete(self) -> Result<()> {
        let Self { file, path, .. } = self;
        drop(file);
        fs::remove_file(&path)?;
        debug!(file = %path.display(), "message log deleted");
        Ok(())
    }

    /// Number of successful appends since open, including replayed records.
    pub fn message_count(&self) -> usize {
        self.message_count
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads one frame. A clean EOF before any length byte yields `None`; any
/// other short read is an error.
fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(StoreError::TruncatedFrame {
                    expected: len_buf.len(),
                    actual: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match reader.read(&mut payload[filled..]) {
            Ok(0) => {
                return Err(StoreError::TruncatedFrame {
                    expected: len,
                    actual: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::TempDir;

    fn log_path(dir: &TempDir) -> PathBuf {
        dir.path().join("testlog.data")
    }

    #[test]
    fn test_open_new_log_replays_nothing() {
        let dir = TempDir::new().unwrap();
        let mut log: MessageLog<String> = MessageLog::open(log_path(&dir)).unwrap();

        let count = log
            .open_and_replay(|_| panic!("consumer must not be invoked on a fresh log"))
            .unwrap();

        assert_eq!(count, 0);
        assert_eq!(log.message_count(), 0);
    }

    #[test]
    fn test_append_and_replay_in_order() {
        let dir = TempDir::new().unwrap();

        {
            let mut log: MessageLog<String> = MessageLog::open(log_path(&dir)).unwrap();
            log.open_and_replay(|_| panic!("fresh log must be empty"))
                .unwrap();
            log.append(&"Hello".to_string()).unwrap();
            log.append(&"World".to_string()).unwrap();
            log.close().unwrap();
        }

        let mut log: MessageLog<String> = MessageLog::open(log_path(&dir)).unwrap();
        let mut messages = Vec::new();
        let count = log
            .open_and_replay(|message| {
                messages.push(message);
                Ok(())
            })
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(log.message_count(), 2);
        assert_eq!(messages, vec!["Hello".to_string(), "World".to_string()]);
    }

    #[test]
    fn test_message_count_tracks_appends() {
        let dir = TempDir::new().unwrap();
        let mut log: MessageLog<u64> = MessageLog::open(log_path(&dir)).unwrap();

        for i in 0..5 {
            log.append(&i).unwrap();
        }
        assert_eq!(log.message_count(), 5);
    }

    #[test]
    fn test_replay_after_append_includes_everything() {
        let dir = TempDir::new().unwrap();
        let mut log: MessageLog<u64> = MessageLog::open(log_path(&dir)).unwrap();

        for i in 0..10 {
            log.append(&i).unwrap();
        }

        // Replays always restart from offset 0.
        let mut seen = Vec::new();
        let count = log
            .open_and_replay(|message| {
                seen.push(message);
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 10);
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_truncated_payload_aborts_replay() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir);

        {
            let mut log: MessageLog<String> = MessageLog::open(&path).unwrap();
            log.append(&"intact".to_string()).unwrap();
            log.close().unwrap();
        }
        // A length prefix that promises more bytes than the file holds.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&100u32.to_le_bytes()).unwrap();
            file.write_all(&[0xDE, 0xAD]).unwrap();
        }

        let mut log: MessageLog<String> = MessageLog::open(&path).unwrap();
        let result = log.open_and_replay(|_| Ok(()));
        assert!(matches!(
            result,
            Err(StoreError::TruncatedFrame {
                expected: 100,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_partial_length_prefix_aborts_replay() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir);

        {
            let mut file = File::create(&path).unwrap();
            file.write_all(&[0x05, 0x00]).unwrap();
        }

        let mut log: MessageLog<String> = MessageLog::open(&path).unwrap();
        assert!(matches!(
            log.open_and_replay(|_| Ok(())),
            Err(StoreError::TruncatedFrame { .. })
        ));
    }

    #[test]
    fn test_consumer_error_aborts_replay() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir);

        {
            let mut log: MessageLog<u64> = MessageLog::open(&path).unwrap();
            log.append(&1).unwrap();
            log.append(&2).unwrap();
            log.close().unwrap();
        }

        let mut log: MessageLog<u64> = MessageLog::open(&path).unwrap();
        let result = log.open_and_replay(|message| {
            if message == 2 {
                Err(StoreError::Closed)
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_delete_removes_backing_file() {
        let dir = TempDir::new().unwrap();
        let path = log_path(&dir);

        let mut log: MessageLog<u64> = MessageLog::open(&path).unwrap();
        log.append(&7).unwrap();
        log.delete().unwrap();

        assert!(!path.exists());
    }
}
