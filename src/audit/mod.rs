//! Audit Module
//!
//! Append-only record of every handled action.
//!
//! ## Responsibilities
//! - One entry per handled known action, written before its side effect
//! - Fire-and-forget from the engine's point of view: append failures are
//!   logged, never reported to the client

mod entry;
mod journal;

pub use entry::AuditEntry;
pub use journal::{read_journal, JournalAuditLog};

use parking_lot::Mutex;

use crate::error::Result;

/// Append-only action log
pub trait AuditLog: Send + Sync {
    /// Append one entry
    fn append(&self, entry: &AuditEntry) -> Result<()>;
}

/// Audit log kept in memory
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry appended so far
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}
