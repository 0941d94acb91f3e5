//! Audit journal
//!
//! JSON-lines file: one serialized `AuditEntry` per line.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{RelayError, Result};
use super::{AuditEntry, AuditLog};

/// File-backed audit log
pub struct JournalAuditLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JournalAuditLog {
    pub const FILENAME: &'static str = "audit.jsonl";

    /// Open or create `audit.jsonl` inside `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(Self::FILENAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for JournalAuditLog {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(())
    }
}

/// Read every entry of a journal file, oldest first
///
/// Blank lines are skipped; a malformed line is an error naming its line number.
pub fn read_journal(path: &Path) -> Result<Vec<AuditEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|e| {
            RelayError::Audit(format!("{}:{}: {}", path.display(), number + 1, e))
        })?;
        entries.push(entry);
    }

    Ok(entries)
}
