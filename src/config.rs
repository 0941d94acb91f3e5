//! Configuration for RelayKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a RelayKV server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the record log and audit journal
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── records.log      (append-only record log)
    ///     └── audit.jsonl      (one audit entry per line)
    pub data_dir: PathBuf,

    /// Which repository/audit pair the server runs on
    pub storage: StorageBackend,

    /// Sync strategy: how often to fsync the record log
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Read timeout used while a subscribed connection waits for `unsubscribe`
    pub poll_timeout_ms: u64,

    /// Write deadline for pushing a notification to one subscriber
    pub notify_write_timeout_ms: u64,

    /// Size of each socket read
    pub read_buffer_size: usize,

    /// Largest request accepted before the connection is dropped
    pub max_message_size: usize,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Records and audit entries live in process memory
    Memory,

    /// Records go to `records.log`, audit entries to `audit.jsonl`
    File,
}

/// Record log sync strategy
#[derive(Debug, Clone, Copy)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./relaykv_data"),
            storage: StorageBackend::File,
            sync_strategy: SyncStrategy::EveryNEntries { count: 16 },
            listen_addr: "0.0.0.0:8080".to_string(),
            poll_timeout_ms: 1000,
            notify_write_timeout_ms: 2000,
            read_buffer_size: 8192,
            max_message_size: 1024 * 1024, // 1 MiB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn notify_write_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_write_timeout_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the storage backend
    pub fn storage(mut self, backend: StorageBackend) -> Self {
        self.config.storage = backend;
        self
    }

    /// Set the record log sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the subscribed-connection poll timeout (in milliseconds)
    pub fn poll_timeout_ms(mut self, ms: u64) -> Self {
        self.config.poll_timeout_ms = ms;
        self
    }

    /// Set the notification write deadline (in milliseconds)
    pub fn notify_write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.notify_write_timeout_ms = ms;
        self
    }

    /// Set the socket read size (in bytes)
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the maximum request size (in bytes)
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
