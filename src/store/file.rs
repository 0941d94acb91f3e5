//! File-backed repository
//!
//! Appends every written record to `records.log` and keeps the latest
//! version of each record in an in-memory index rebuilt on open.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

use crate::config::SyncStrategy;
use crate::error::{RelayError, Result};
use super::{Record, Repository};

/// Entry header: crc32 (4) + payload length (4)
pub const ENTRY_HEADER_SIZE: usize = 8;

/// Largest entry payload written or replayed (16 MB)
pub const MAX_ENTRY_SIZE: usize = 16 * 1024 * 1024;

/// Outcome of replaying the record log on open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of log entries successfully replayed
    pub entries_recovered: u64,

    /// Number of distinct records after replay
    pub records: usize,

    /// Whether a torn or corrupted tail was cut off
    pub was_truncated: bool,

    /// Bytes removed from the end of the log
    pub bytes_truncated: u64,
}

/// Exclusive append handle for the log
struct LogWriter {
    writer: BufWriter<File>,
    sync_strategy: SyncStrategy,
    unsynced: usize,
}

impl LogWriter {
    fn append(&mut self, record: &Record) -> Result<()> {
        let entry = encode_entry(record)?;
        self.writer.write_all(&entry)?;
        self.writer.flush()?;
        self.unsynced += 1;

        let should_sync = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => self.unsynced >= count.max(1),
        };
        if should_sync {
            self.sync()?;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }
}

/// Repository persisted as an append-only record log
///
/// ## Concurrency:
/// - `index`: RwLock (many concurrent readers, exclusive writer)
/// - `writer`: Mutex held across append + index update, so puts to the
///   same key land in the index in log order
pub struct FileRepository {
    path: PathBuf,
    index: RwLock<BTreeMap<String, Record>>,
    writer: Mutex<LogWriter>,
    recovery: RecoveryResult,
}

impl FileRepository {
    const LOG_FILENAME: &'static str = "records.log";

    /// Open or create the record log inside `data_dir`
    ///
    /// On open:
    /// 1. Create the directory if needed
    /// 2. Replay every valid entry into the index
    /// 3. Truncate a torn/corrupted tail
    /// 4. Reopen for appending
    pub fn open(data_dir: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(Self::LOG_FILENAME);

        let (index, recovery) = if path.exists() {
            Self::recover(&path)?
        } else {
            (BTreeMap::new(), RecoveryResult::default())
        };

        if recovery.entries_recovered > 0 || recovery.was_truncated {
            tracing::info!(
                "Record log recovery: {} entries replayed, {} records, {} bytes truncated",
                recovery.entries_recovered,
                recovery.records,
                recovery.bytes_truncated
            );
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            index: RwLock::new(index),
            writer: Mutex::new(LogWriter {
                writer: BufWriter::new(file),
                sync_strategy,
                unsynced: 0,
            }),
            recovery,
        })
    }

    /// Replay the log, truncating anything after the last valid entry
    fn recover(path: &Path) -> Result<(BTreeMap<String, Record>, RecoveryResult)> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;

        let mut index = BTreeMap::new();
        let mut result = RecoveryResult::default();
        let mut offset = 0usize;

        while offset < bytes.len() {
            match decode_entry(&bytes[offset..]) {
                Ok((record, consumed)) => {
                    index.insert(record.id.clone(), record);
                    result.entries_recovered += 1;
                    offset += consumed;
                }
                Err(e) => {
                    tracing::warn!(
                        "Record log {} damaged at offset {}: {}",
                        path.display(),
                        offset,
                        e
                    );
                    break;
                }
            }
        }

        if offset < bytes.len() {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset as u64)?;
            file.sync_all()?;
            result.was_truncated = true;
            result.bytes_truncated = (bytes.len() - offset) as u64;
        }

        result.records = index.len();
        Ok((index, result))
    }

    /// Force pending appends to disk
    pub fn sync(&self) -> Result<()> {
        self.writer.lock().sync()
    }

    /// Path of the record log
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What the last open recovered
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }
}

impl Repository for FileRepository {
    fn get(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.index.read().get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Record>> {
        Ok(self.index.read().values().cloned().collect())
    }

    fn put(&self, record: &Record) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.append(record)?;
        self.index.write().insert(record.id.clone(), record.clone());
        Ok(())
    }
}

impl Drop for FileRepository {
    fn drop(&mut self) {
        if let Err(e) = self.writer.get_mut().sync() {
            tracing::warn!("Failed to sync record log {}: {}", self.path.display(), e);
        }
    }
}

/// Encode one log entry: [crc32 (4)][len (4)][payload]
pub(crate) fn encode_entry(record: &Record) -> Result<Vec<u8>> {
    let payload = bincode::serialize(record)?;
    if payload.len() > MAX_ENTRY_SIZE {
        return Err(RelayError::Storage(format!(
            "Record {} too large: {} bytes (max {})",
            record.id,
            payload.len(),
            MAX_ENTRY_SIZE
        )));
    }
    let crc = crc32fast::hash(&payload);

    let mut entry = Vec::with_capacity(ENTRY_HEADER_SIZE + payload.len());
    entry.extend_from_slice(&crc.to_le_bytes());
    entry.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    entry.extend_from_slice(&payload);
    Ok(entry)
}

/// Decode the entry at the start of `bytes`
///
/// Returns the record and the number of bytes consumed.
pub(crate) fn decode_entry(bytes: &[u8]) -> Result<(Record, usize)> {
    if bytes.len() < ENTRY_HEADER_SIZE {
        return Err(RelayError::LogCorruption(format!(
            "Incomplete header: expected {} bytes, got {}",
            ENTRY_HEADER_SIZE,
            bytes.len()
        )));
    }

    let crc = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;

    if len > MAX_ENTRY_SIZE {
        return Err(RelayError::LogCorruption(format!(
            "Entry too large: {} bytes (max {})",
            len, MAX_ENTRY_SIZE
        )));
    }

    let total = ENTRY_HEADER_SIZE + len;
    if bytes.len() < total {
        return Err(RelayError::LogCorruption(format!(
            "Incomplete payload: expected {} bytes, got {}",
            len,
            bytes.len() - ENTRY_HEADER_SIZE
        )));
    }

    let payload = &bytes[ENTRY_HEADER_SIZE..total];
    let actual = crc32fast::hash(payload);
    if actual != crc {
        return Err(RelayError::LogCorruption(format!(
            "Checksum mismatch: stored {:08x}, computed {:08x}",
            crc, actual
        )));
    }

    let record: Record = bincode::deserialize(payload)?;
    Ok((record, total))
}
