//! In-memory repository
//!
//! BTreeMap wrapped in a parking_lot RwLock.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::Result;
use super::{Record, Repository};

/// Repository keeping every record in process memory
#[derive(Default)]
pub struct MemoryRepository {
    records: RwLock<BTreeMap<String, Record>>,
}

impl MemoryRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Repository for MemoryRepository {
    fn get(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.records.read().get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Record>> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn put(&self, record: &Record) -> Result<()> {
        self.records
            .write()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }
}
