//! RelayKV CLI Client
//!
//! Command-line interface for interacting with RelayKV.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use relaykv::audit::read_journal;
use relaykv::audit::JournalAuditLog;
use relaykv::client::{machine_uuid, Client, NotificationLog, WatchEvent};
use relaykv::{RelayError, Result};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

/// RelayKV CLI
#[derive(Parser, Debug)]
#[command(name = "relaykv-cli")]
#[command(about = "CLI for the RelayKV record store")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Client identity sent as UUID (derived from this machine if omitted)
    #[arg(short, long)]
    uuid: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a record by id
    Get {
        /// The record id
        id: String,
    },

    /// List every record
    List,

    /// Create or update a record
    Set {
        /// The record id
        id: String,

        /// Fields as key=value
        fields: Vec<String>,
    },

    /// Send a JSON request read from a file
    Send {
        /// File holding the request object
        input: PathBuf,

        /// Also write the response here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Subscribe and print notifications, reconnecting when the server goes away
    Watch {
        /// Unsubscribe after this many notifications
        #[arg(short, long)]
        count: Option<u64>,

        /// Also append every message to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seconds between reconnect attempts
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(5..))]
        retry: u64,
    },

    /// Print the audit journal of a data directory
    Audit {
        /// Server data directory
        data_dir: PathBuf,
    },
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt().with_env_filter(filter).with_target(false).init();

    let uuid = args.uuid.clone().unwrap_or_else(machine_uuid);
    let client = Client::new(&args.server, uuid);

    if let Err(e) = run(&client, args.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(client: &Client, command: Commands) -> Result<()> {
    match command {
        Commands::Get { id } => print_json(&client.get(&id)?),
        Commands::List => print_json(&client.list()?),
        Commands::Set { id, fields } => {
            let fields = parse_fields(&fields)?;
            print_json(&client.set(&id, &fields)?)
        }
        Commands::Send { input, output } => {
            let request: Value = serde_json::from_slice(&std::fs::read(&input)?)?;
            let response = client.request(&request)?;
            if let Some(output) = output {
                std::fs::write(&output, serde_json::to_vec_pretty(&response)?)?;
                tracing::info!("Response saved to {}", output.display());
            }
            print_json(&response)
        }
        Commands::Watch {
            count,
            output,
            retry,
        } => watch(client, count, output, retry),
        Commands::Audit { data_dir } => {
            let entries = read_journal(&data_dir.join(JournalAuditLog::FILENAME))?;
            for entry in &entries {
                println!(
                    "{}  {:<11}  uuid={}  session={}  record={}",
                    entry.timestamp.to_rfc3339(),
                    entry.action,
                    entry.uuid,
                    entry.session,
                    entry.record_id.as_deref().unwrap_or("-")
                );
            }
            println!("{} entries", entries.len());
            Ok(())
        }
    }
}

fn watch(client: &Client, count: Option<u64>, output: Option<PathBuf>, retry: u64) -> Result<()> {
    let mut log = output.map(NotificationLog::open).transpose()?;
    let mut received = 0u64;

    let reply = client.watch(Duration::from_secs(retry), |event| {
        match event {
            WatchEvent::Subscribed(confirmation) => {
                print_json(confirmation)?;
                if let Some(log) = log.as_mut() {
                    if let Err(e) = log.append_confirmation(confirmation) {
                        tracing::error!("Failed to write {}: {}", log.path().display(), e);
                    }
                }
            }
            WatchEvent::Notification(message) => {
                received += 1;
                print_json(message)?;
                if let Some(log) = log.as_mut() {
                    if let Err(e) = log.append_notification(received, message) {
                        tracing::error!("Failed to write {}: {}", log.path().display(), e);
                    }
                }
            }
            WatchEvent::Disconnected => {
                tracing::warn!("Connection lost, reconnecting in {}s", retry);
            }
        }
        Ok(count.map_or(true, |limit| received < limit))
    })?;

    tracing::info!("{} notifications received", received);
    match reply {
        Some(reply) => print_json(&reply),
        None => Ok(()),
    }
}

/// Parse `key=value` arguments
fn parse_fields(fields: &[String]) -> Result<BTreeMap<String, String>> {
    fields
        .iter()
        .map(|field| {
            field
                .split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| RelayError::Config(format!("expected key=value, got '{}'", field)))
        })
        .collect()
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
