//! RelayKV Server Binary
//!
//! Starts the TCP server for RelayKV.

use std::sync::Arc;

use clap::{Parser, ValueEnum};
use relaykv::config::StorageBackend;
use relaykv::network::Server;
use relaykv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// Storage backend choice on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Storage {
    /// Keep records and audit entries in memory
    Memory,
    /// Persist records and audit entries under the data directory
    File,
}

impl From<Storage> for StorageBackend {
    fn from(storage: Storage) -> Self {
        match storage {
            Storage::Memory => StorageBackend::Memory,
            Storage::File => StorageBackend::File,
        }
    }
}

/// RelayKV Server
#[derive(Parser, Debug)]
#[command(name = "relaykv-server")]
#[command(about = "JSON record store with push notifications")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Data directory
    #[arg(short, long, default_value = "./relaykv_data")]
    data_dir: String,

    /// Storage backend
    #[arg(short, long, value_enum, default_value = "file")]
    storage: Storage,

    /// Read timeout while waiting for a subscriber's unsubscribe (ms)
    #[arg(long, default_value = "1000")]
    poll_timeout_ms: u64,

    /// Write deadline for each notification (ms)
    #[arg(long, default_value = "2000")]
    notify_timeout_ms: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize tracing/logging
    let default_filter = if args.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    tracing::info!("RelayKV Server v{}", relaykv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);
    tracing::info!("Storage backend: {:?}", args.storage);

    // Build config from args
    let config = Config::builder()
        .listen_addr(&args.listen)
        .data_dir(&args.data_dir)
        .storage(args.storage.into())
        .poll_timeout_ms(args.poll_timeout_ms)
        .notify_write_timeout_ms(args.notify_timeout_ms)
        .build();

    // Open engine
    let engine = match Engine::open(&config) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Engine initialized successfully");

    let server = match Server::bind(&config, engine) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
