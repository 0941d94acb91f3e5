//! Store Module
//!
//! Record repositories consumed by the request engine.
//!
//! ## Responsibilities
//! - Point lookups by record id
//! - Full listing (fully materialized before return)
//! - Atomic per-key writes; no multi-key transactions
//!
//! ## Record Log Format (FileRepository)
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ bincode(Record) │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2 ...                             │
//! └─────────────────────────────────────────┘
//! ```

mod record;
mod memory;
mod file;

pub use record::{field_text, Record, DEFAULT_FIELDS, ID_FIELD};
pub use memory::MemoryRepository;
pub use file::{FileRepository, RecoveryResult, ENTRY_HEADER_SIZE, MAX_ENTRY_SIZE};

use crate::error::Result;

/// Key-value record storage
///
/// Implementations handle their own concurrency: `get` and `put` must be
/// atomic per key.
pub trait Repository: Send + Sync {
    /// Fetch a record by id
    fn get(&self, id: &str) -> Result<Option<Record>>;

    /// All records, ordered by id
    fn list(&self) -> Result<Vec<Record>>;

    /// Insert or replace a record
    fn put(&self, record: &Record) -> Result<()>;
}
