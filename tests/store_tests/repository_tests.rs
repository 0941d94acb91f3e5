//! Repository Tests
//!
//! Tests verify:
//! - Memory and file repositories agree on get/list/put
//! - The record log survives reopen
//! - Torn and corrupted tails are truncated on recovery
//! - Concurrent puts to distinct keys all land

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::thread;

use relaykv::config::SyncStrategy;
use relaykv::store::{
    FileRepository, MemoryRepository, Record, Repository, ENTRY_HEADER_SIZE, MAX_ENTRY_SIZE,
};
use relaykv::RelayError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn record(id: &str, pairs: &[(&str, &str)]) -> Record {
    let fields = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Record::create(id, fields)
}

fn open_file_repo(dir: &TempDir) -> FileRepository {
    FileRepository::open(dir.path(), SyncStrategy::EveryWrite).unwrap()
}

fn exercise_basic_operations(repo: &dyn Repository) {
    assert!(repo.get("missing").unwrap().is_none());
    assert!(repo.list().unwrap().is_empty());

    repo.put(&record("b", &[("cp", "2")])).unwrap();
    repo.put(&record("a", &[("cp", "1")])).unwrap();

    assert_eq!(repo.get("a").unwrap().unwrap().get("cp"), Some("1"));

    let ids: Vec<String> = repo.list().unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

    repo.put(&record("a", &[("cp", "9")])).unwrap();
    assert_eq!(repo.get("a").unwrap().unwrap().get("cp"), Some("9"));
    assert_eq!(repo.list().unwrap().len(), 2);
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_memory_repository_basic_operations() {
    let repo = MemoryRepository::new();
    exercise_basic_operations(&repo);
    assert_eq!(repo.len(), 2);
}

#[test]
fn test_file_repository_basic_operations() {
    let dir = TempDir::new().unwrap();
    let repo = open_file_repo(&dir);
    exercise_basic_operations(&repo);
    assert_eq!(repo.len(), 2);
}

#[test]
fn test_file_repository_creates_log_file() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("nested");

    let repo = FileRepository::open(&data_dir, SyncStrategy::EveryWrite).unwrap();

    assert!(data_dir.join("records.log").exists());
    assert_eq!(repo.path(), data_dir.join("records.log"));
    assert!(repo.is_empty());
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_file_repository_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let repo = open_file_repo(&dir);
        repo.put(&record("E1", &[("cp", "3100")])).unwrap();
        repo.put(&record("E2", &[("sede", "Parana")])).unwrap();
        repo.put(&record("E1", &[("cp", "3260")])).unwrap();
    }

    let repo = open_file_repo(&dir);

    assert_eq!(repo.len(), 2);
    assert_eq!(repo.get("E1").unwrap().unwrap().get("cp"), Some("3260"));
    assert_eq!(repo.get("E2").unwrap().unwrap().get("sede"), Some("Parana"));

    let recovery = repo.recovery();
    assert_eq!(recovery.entries_recovered, 3);
    assert_eq!(recovery.records, 2);
    assert!(!recovery.was_truncated);
}

#[test]
fn test_file_repository_batched_sync_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let repo = FileRepository::open(dir.path(), SyncStrategy::EveryNEntries { count: 100 }).unwrap();
        for i in 0..10 {
            repo.put(&record(&format!("k{}", i), &[])).unwrap();
        }
    }

    let repo = open_file_repo(&dir);
    assert_eq!(repo.len(), 10);
}

#[test]
fn test_file_repository_truncates_torn_tail() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("records.log");
    {
        let repo = open_file_repo(&dir);
        repo.put(&record("E1", &[("cp", "3100")])).unwrap();
    }
    let valid_len = std::fs::metadata(&log_path).unwrap().len();

    // Header promising 64 bytes followed by only 3
    {
        let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
        file.write_all(&0u32.to_le_bytes()).unwrap();
        file.write_all(&64u32.to_le_bytes()).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();
    }

    let repo = open_file_repo(&dir);

    assert_eq!(repo.len(), 1);
    assert!(repo.recovery().was_truncated);
    assert_eq!(repo.recovery().bytes_truncated, (ENTRY_HEADER_SIZE + 3) as u64);
    assert_eq!(std::fs::metadata(&log_path).unwrap().len(), valid_len);

    // The log stays appendable after truncation
    repo.put(&record("E2", &[])).unwrap();
    drop(repo);
    assert_eq!(open_file_repo(&dir).len(), 2);
}

#[test]
fn test_file_repository_stops_at_checksum_mismatch() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("records.log");
    {
        let repo = open_file_repo(&dir);
        repo.put(&record("E1", &[])).unwrap();
        repo.put(&record("E2", &[])).unwrap();
    }

    // Flip the last byte of the second entry's payload
    let mut bytes = std::fs::read(&log_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&log_path, &bytes).unwrap();

    let repo = open_file_repo(&dir);

    assert_eq!(repo.len(), 1);
    assert!(repo.get("E1").unwrap().is_some());
    assert!(repo.get("E2").unwrap().is_none());
    assert!(repo.recovery().was_truncated);
}

#[test]
fn test_file_repository_rejects_oversized_record() {
    let dir = TempDir::new().unwrap();
    let repo = open_file_repo(&dir);
    repo.put(&record("E1", &[("cp", "3100")])).unwrap();
    let huge = "x".repeat(MAX_ENTRY_SIZE + 1);

    let err = repo.put(&record("E2", &[("blob", huge.as_str())])).unwrap_err();

    assert!(matches!(err, RelayError::Storage(_)));
    assert!(repo.get("E2").unwrap().is_none());

    // Nothing unreplayable reached the log
    drop(repo);
    let reopened = open_file_repo(&dir);
    assert_eq!(reopened.len(), 1);
    assert!(!reopened.recovery().was_truncated);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_file_repository_concurrent_puts() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(FileRepository::open(dir.path(), SyncStrategy::EveryNEntries { count: 50 }).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                for i in 0..25 {
                    repo.put(&record(&format!("t{}-{}", t, i), &[])).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(repo.len(), 100);
    repo.sync().unwrap();
    drop(repo);

    assert_eq!(open_file_repo(&dir).len(), 100);
}

#[test]
fn test_memory_repository_put_replaces_whole_record() {
    let repo = MemoryRepository::new();
    repo.put(&Record::new("E1", BTreeMap::from([("a".to_string(), "1".to_string())]))).unwrap();
    repo.put(&Record::new("E1", BTreeMap::from([("b".to_string(), "2".to_string())]))).unwrap();

    let stored = repo.get("E1").unwrap().unwrap();
    assert_eq!(stored.get("a"), None);
    assert_eq!(stored.get("b"), Some("2"));
}
